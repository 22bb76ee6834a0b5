use crate::limits::MAX_SEATS_PER_RESERVATION;
use crate::model::Seat;

use super::EngineError;

/// Validate the shape of a seat request and return it sorted.
///
/// The seats must be non-empty, unique, and once sorted form one unbroken
/// run inside a single row.
pub fn normalize_seats(seats: &[Seat]) -> Result<Vec<Seat>, EngineError> {
    if seats.is_empty() {
        return Err(EngineError::NoSeatsRequested);
    }
    if seats.len() > MAX_SEATS_PER_RESERVATION {
        return Err(EngineError::LimitExceeded("too many seats in one reservation"));
    }
    let mut sorted = seats.to_vec();
    sorted.sort();
    if let Some(pair) = sorted.windows(2).find(|w| w[0] == w[1]) {
        return Err(EngineError::DuplicateSeat(pair[0]));
    }
    if !sorted.windows(2).all(|w| w[0].is_followed_by(&w[1])) {
        return Err(EngineError::SeatsNotContiguous(sorted));
    }
    Ok(sorted)
}
