//! Persistence seams the engine talks to. The engine never touches maps or
//! files directly; it goes through `ShowtimeCatalog` and `TicketStore`.

mod memory;
mod wal;
mod writer;

pub use memory::MemoryStore;
pub use wal::{Replay, Wal};
#[cfg(test)]
pub(crate) use wal::Fault;

use std::io;

use async_trait::async_trait;
use ulid::Ulid;

use crate::model::*;
use crate::seatmap::Auditorium;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("WAL I/O: {0}")]
    Io(#[from] io::Error),
    #[error("WAL writer shut down")]
    WriterClosed,
    #[error("already exists: {0}")]
    Duplicate(String),
    #[error("missing: {0}")]
    Missing(String),
    #[error("rejected update: {0}")]
    Rejected(&'static str),
    #[error("store full: {0}")]
    Full(&'static str),
}

/// Which tickets of a showtime to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketFilter {
    All,
    /// Paid, or unpaid and still inside the hold window at `now`.
    Occupying { now: Ms },
    /// Unpaid holds whose window lapsed before `now`.
    Reclaimable { now: Ms },
}

impl TicketFilter {
    pub fn matches(&self, ticket: &Ticket) -> bool {
        match self {
            TicketFilter::All => true,
            TicketFilter::Occupying { now } => ticket.occupies(*now),
            TicketFilter::Reclaimable { now } => ticket.is_expired(*now),
        }
    }
}

/// Showtime, auditorium and seat-map lookup. Auditoriums and showtimes are
/// written once and read-only afterwards.
#[async_trait]
pub trait ShowtimeCatalog: Send + Sync {
    async fn get_showtime(&self, id: Ulid) -> Result<Option<Showtime>, StoreError>;

    async fn get_showtime_with_auditorium(
        &self,
        id: Ulid,
    ) -> Result<Option<(Showtime, Auditorium)>, StoreError>;

    async fn get_auditorium(&self, id: AuditoriumId) -> Result<Option<Auditorium>, StoreError>;

    /// Seats of an auditorium in row-major order; `None` if it does not exist.
    async fn get_seats(&self, auditorium_id: AuditoriumId) -> Result<Option<Vec<Seat>>, StoreError>;

    async fn list_showtimes(&self) -> Result<Vec<Showtime>, StoreError>;

    async fn insert_auditorium(&self, auditorium: Auditorium) -> Result<(), StoreError>;

    async fn insert_showtime(&self, showtime: Showtime) -> Result<(), StoreError>;
}

/// Ticket persistence. The only shared mutable state in the system.
#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn insert_ticket(&self, ticket: Ticket) -> Result<Ticket, StoreError>;

    async fn get_ticket(&self, id: Ulid) -> Result<Option<Ticket>, StoreError>;

    /// Tickets of one showtime ordered by creation time.
    async fn list_tickets(
        &self,
        showtime_id: Ulid,
        filter: TicketFilter,
    ) -> Result<Vec<Ticket>, StoreError>;

    /// Persist a changed ticket. Only the paid flag may change, and only to `true`.
    async fn update_ticket(&self, ticket: &Ticket) -> Result<(), StoreError>;

    async fn delete_tickets(&self, tickets: &[Ticket]) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters() {
        let hold = Ticket {
            id: Ulid::new(),
            showtime_id: Ulid::new(),
            seats: vec![Seat::new(1, 1)],
            created_at: 0,
            paid: false,
        };
        let sold = Ticket { paid: true, ..hold.clone() };
        let later = HOLD_DURATION_MS + 1;

        assert!(TicketFilter::All.matches(&hold));
        assert!(TicketFilter::Occupying { now: 0 }.matches(&hold));
        assert!(!TicketFilter::Occupying { now: later }.matches(&hold));
        assert!(TicketFilter::Reclaimable { now: later }.matches(&hold));
        assert!(TicketFilter::Occupying { now: later }.matches(&sold));
        assert!(!TicketFilter::Reclaimable { now: later }.matches(&sold));
    }
}
