use serde::{Deserialize, Serialize};

use crate::engine::EngineError;
use crate::limits::*;
use crate::model::{AuditoriumId, Seat};

/// Physical seat arrangement of an auditorium.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeatLayout {
    /// Every row has the same number of seats, numbered from 1.
    Grid { rows: u16, seats_per_row: u16 },
    /// Irregular rooms. Sorted by (row, number), no duplicates.
    Explicit(Vec<Seat>),
}

/// An auditorium and its seat map. Immutable once provisioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auditorium {
    pub id: AuditoriumId,
    pub layout: SeatLayout,
}

impl Auditorium {
    pub fn grid(id: AuditoriumId, rows: u16, seats_per_row: u16) -> Result<Self, EngineError> {
        if rows == 0 || seats_per_row == 0 {
            return Err(EngineError::InvalidLayout("auditorium has no seats"));
        }
        if rows > MAX_ROWS || seats_per_row > MAX_SEATS_PER_ROW {
            return Err(EngineError::LimitExceeded("auditorium too large"));
        }
        Ok(Self {
            id,
            layout: SeatLayout::Grid { rows, seats_per_row },
        })
    }

    pub fn explicit(id: AuditoriumId, mut seats: Vec<Seat>) -> Result<Self, EngineError> {
        if seats.is_empty() {
            return Err(EngineError::InvalidLayout("auditorium has no seats"));
        }
        if seats
            .iter()
            .any(|s| s.row == 0 || s.number == 0 || s.row > MAX_ROWS || s.number > MAX_SEATS_PER_ROW)
        {
            return Err(EngineError::InvalidLayout("seat coordinates out of range"));
        }
        seats.sort();
        if let Some(pair) = seats.windows(2).find(|w| w[0] == w[1]) {
            return Err(EngineError::DuplicateSeat(pair[0]));
        }
        Ok(Self {
            id,
            layout: SeatLayout::Explicit(seats),
        })
    }

    /// All seats, row ascending then number ascending.
    pub fn seats(&self) -> Vec<Seat> {
        match &self.layout {
            SeatLayout::Grid { rows, seats_per_row } => (1..=*rows)
                .flat_map(|row| (1..=*seats_per_row).map(move |number| Seat::new(row, number)))
                .collect(),
            SeatLayout::Explicit(seats) => seats.clone(),
        }
    }

    pub fn contains(&self, seat: &Seat) -> bool {
        match &self.layout {
            SeatLayout::Grid { rows, seats_per_row } => {
                (1..=*rows).contains(&seat.row) && (1..=*seats_per_row).contains(&seat.number)
            }
            SeatLayout::Explicit(seats) => seats.binary_search(seat).is_ok(),
        }
    }

    pub fn seat_count(&self) -> usize {
        match &self.layout {
            SeatLayout::Grid { rows, seats_per_row } => *rows as usize * *seats_per_row as usize,
            SeatLayout::Explicit(seats) => seats.len(),
        }
    }
}
