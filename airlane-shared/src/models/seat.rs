use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Normalized, comparable seat identity within one aircraft.
///
/// Both components are 1-based. Every seat representation accepted at the
/// boundary (numeric pairs, `"12C"` labels, explicit seat maps) is reduced to
/// this key before it reaches the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeatKey {
    pub row: u16,
    pub seat: u16,
}

impl SeatKey {
    pub fn new(row: i64, seat: i64) -> Result<Self, SeatParseError> {
        let row = u16::try_from(row)
            .ok()
            .filter(|r| *r >= 1)
            .ok_or(SeatParseError::InvalidRow(row))?;
        let seat = u16::try_from(seat)
            .ok()
            .filter(|s| *s >= 1)
            .ok_or(SeatParseError::InvalidSeat(seat))?;
        Ok(Self { row, seat })
    }
}

impl fmt::Display for SeatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.seat <= 26 {
            let letter = (b'A' + (self.seat - 1) as u8) as char;
            write!(f, "{}{}", self.row, letter)
        } else {
            write!(f, "{}/{}", self.row, self.seat)
        }
    }
}

impl FromStr for SeatKey {
    type Err = SeatParseError;

    /// Accepts `"12C"` (letters A-Z are seats 1-26) or `"12/27"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim();
        let malformed = || SeatParseError::Malformed(s.to_string());

        if let Some((row, seat)) = label.split_once('/') {
            let row: i64 = row.trim().parse().map_err(|_| malformed())?;
            let seat: i64 = seat.trim().parse().map_err(|_| malformed())?;
            return Self::new(row, seat);
        }

        let split = label
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(malformed)?;
        let (row, letters) = label.split_at(split);
        let row: i64 = row.parse().map_err(|_| malformed())?;

        let mut chars = letters.chars();
        let letter = match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_alphabetic() => c.to_ascii_uppercase(),
            _ => return Err(malformed()),
        };
        Self::new(row, (letter as u8 - b'A' + 1) as i64)
    }
}

/// Seat as supplied by a caller, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeatDesignator {
    Numeric { row: i64, seat: i64 },
    Label { seat: String },
}

impl SeatDesignator {
    pub fn normalize(&self) -> Result<SeatKey, SeatParseError> {
        match self {
            SeatDesignator::Numeric { row, seat } => SeatKey::new(*row, *seat),
            SeatDesignator::Label { seat } => seat.parse(),
        }
    }
}

impl From<SeatKey> for SeatDesignator {
    fn from(key: SeatKey) -> Self {
        SeatDesignator::Numeric {
            row: key.row as i64,
            seat: key.seat as i64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SeatParseError {
    #[error("row must be a positive number, not {0}")]
    InvalidRow(i64),

    #[error("seat must be a positive number, not {0}")]
    InvalidSeat(i64),

    #[error("malformed seat designator: {0:?}")]
    Malformed(String),

    #[error("cabin layout must contain at least one seat")]
    EmptyLayout,
}

/// Physical seat arrangement of an aircraft; fixes its capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CabinLayout {
    /// Uniform cabin: every row has the same number of seats.
    Grid { rows: u16, seats_in_row: u16 },
    /// Irregular cabin described seat by seat.
    SeatMap { seats: BTreeSet<SeatKey> },
}

impl CabinLayout {
    pub fn grid(rows: u16, seats_in_row: u16) -> Result<Self, SeatParseError> {
        if rows == 0 || seats_in_row == 0 {
            return Err(SeatParseError::EmptyLayout);
        }
        Ok(CabinLayout::Grid { rows, seats_in_row })
    }

    pub fn from_labels<'a, I>(labels: I) -> Result<Self, SeatParseError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let seats = labels
            .into_iter()
            .map(str::parse)
            .collect::<Result<BTreeSet<SeatKey>, _>>()?;
        if seats.is_empty() {
            return Err(SeatParseError::EmptyLayout);
        }
        Ok(CabinLayout::SeatMap { seats })
    }

    pub fn capacity(&self) -> usize {
        match self {
            CabinLayout::Grid { rows, seats_in_row } => *rows as usize * *seats_in_row as usize,
            CabinLayout::SeatMap { seats } => seats.len(),
        }
    }

    pub fn contains(&self, key: &SeatKey) -> bool {
        match self {
            CabinLayout::Grid { rows, seats_in_row } => {
                (1..=*rows).contains(&key.row) && (1..=*seats_in_row).contains(&key.seat)
            }
            CabinLayout::SeatMap { seats } => seats.contains(key),
        }
    }
}
