use airlane_shared::{CabinLayout, SeatParseError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An airframe and its seat layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aircraft {
    pub id: Uuid,
    pub name: String,
    pub aircraft_type: String,
    pub registration_number: String,
    pub layout: CabinLayout,
    pub is_active: bool,
}

impl Aircraft {
    /// Uniform cabin of `rows` x `seats_in_row`
    pub fn with_grid(
        name: impl Into<String>,
        aircraft_type: impl Into<String>,
        registration_number: impl Into<String>,
        rows: u16,
        seats_in_row: u16,
    ) -> Result<Self, AircraftError> {
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            aircraft_type: aircraft_type.into(),
            registration_number: registration_number.into(),
            layout: CabinLayout::grid(rows, seats_in_row)?,
            is_active: true,
        })
    }

    /// Irregular cabin from seat labels such as `["1A", "1C", "2A"]`
    pub fn with_seat_map<'a, I>(
        name: impl Into<String>,
        aircraft_type: impl Into<String>,
        registration_number: impl Into<String>,
        labels: I,
    ) -> Result<Self, AircraftError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            aircraft_type: aircraft_type.into(),
            registration_number: registration_number.into(),
            layout: CabinLayout::from_labels(labels)?,
            is_active: true,
        })
    }

    /// Number of sellable seats
    pub fn capacity(&self) -> usize {
        self.layout.capacity()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AircraftError {
    #[error("Invalid cabin layout: {0}")]
    InvalidLayout(#[from] SeatParseError),

    #[error("Aircraft {0} is not active")]
    Inactive(Uuid),
}
