use std::collections::BTreeSet;
use std::time::Instant;

use ulid::Ulid;

use crate::model::*;
use crate::observability::AVAILABILITY_DURATION_SECONDS;
use crate::seatmap::Auditorium;

use super::{Engine, EngineError};

// ── Availability Algorithm ────────────────────────────────────────

/// Union of the seats held by tickets that still occupy at `now`:
/// every paid ticket, and unpaid ones inside their hold window.
pub fn occupied_seats(tickets: &[Ticket], now: Ms) -> BTreeSet<Seat> {
    tickets
        .iter()
        .filter(|t| t.occupies(now))
        .flat_map(|t| t.seats.iter().copied())
        .collect()
}

/// Auditorium seats minus `occupied`, row-major.
pub fn free_seats(auditorium: &Auditorium, occupied: &BTreeSet<Seat>) -> Vec<Seat> {
    auditorium
        .seats()
        .into_iter()
        .filter(|s| !occupied.contains(s))
        .collect()
}

impl Engine {
    /// Seats of the showtime nobody holds right now, row-major.
    ///
    /// Side effect: expired holds of this showtime are reclaimed (deleted)
    /// before the answer is computed, so a read can mutate stored state.
    pub async fn available_seats(&self, showtime_id: Ulid) -> Result<Vec<Seat>, EngineError> {
        let started = Instant::now();
        let (_, auditorium) = self.showtime_with_auditorium(showtime_id).await?;

        let _guard = self.lock_showtime(showtime_id).await;
        let occupied = self.occupancy_locked(showtime_id, self.now()).await?;
        let free = free_seats(&auditorium, &occupied);

        metrics::histogram!(AVAILABILITY_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        Ok(free)
    }
}
