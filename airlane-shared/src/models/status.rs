use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Flight status in the operational lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlightStatus {
    Scheduled,
    Delayed,
    Boarding,
    InFlight,
    Landed,
    Diverted,
    Cancelled,
}

impl FlightStatus {
    /// Seats can only be sold while the aircraft has not left the gate.
    pub fn is_bookable(&self) -> bool {
        matches!(
            self,
            FlightStatus::Scheduled | FlightStatus::Delayed | FlightStatus::Boarding
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FlightStatus::Scheduled => "SCHEDULED",
            FlightStatus::Delayed => "DELAYED",
            FlightStatus::Boarding => "BOARDING",
            FlightStatus::InFlight => "IN_FLIGHT",
            FlightStatus::Landed => "LANDED",
            FlightStatus::Diverted => "DIVERTED",
            FlightStatus::Cancelled => "CANCELLED",
        }
    }
}

impl Default for FlightStatus {
    fn default() -> Self {
        FlightStatus::Scheduled
    }
}

impl fmt::Display for FlightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlightStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SCHEDULED" => Ok(FlightStatus::Scheduled),
            "DELAYED" => Ok(FlightStatus::Delayed),
            "BOARDING" => Ok(FlightStatus::Boarding),
            "IN_FLIGHT" | "DEPARTED" => Ok(FlightStatus::InFlight),
            "LANDED" => Ok(FlightStatus::Landed),
            "DIVERTED" => Ok(FlightStatus::Diverted),
            "CANCELLED" => Ok(FlightStatus::Cancelled),
            other => Err(format!("Unknown flight status: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses_are_not_bookable() {
        assert!(FlightStatus::Scheduled.is_bookable());
        assert!(FlightStatus::Delayed.is_bookable());
        assert!(!FlightStatus::InFlight.is_bookable());
        assert!(!FlightStatus::Cancelled.is_bookable());
        assert_eq!("departed".parse::<FlightStatus>(), Ok(FlightStatus::InFlight));
        assert_eq!(FlightStatus::InFlight.to_string(), "IN_FLIGHT");
    }
}
