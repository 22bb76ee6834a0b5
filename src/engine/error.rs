use ulid::Ulid;

use crate::model::{fmt_seats, AuditoriumId, Ms, Seat};
use crate::store::StoreError;

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidRequest,
    Conflict,
    Storage,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("showtime not found: {0}")]
    ShowtimeNotFound(Ulid),
    #[error("reservation not found: {0}")]
    ReservationNotFound(Ulid),
    #[error("auditorium not found: {0}")]
    AuditoriumNotFound(AuditoriumId),
    #[error("movie not found: {0}")]
    MovieNotFound(String),

    #[error("no seats requested")]
    NoSeatsRequested,
    #[error("seat {0} requested twice")]
    DuplicateSeat(Seat),
    #[error("seats not contiguous: {}", fmt_seats(.0))]
    SeatsNotContiguous(Vec<Seat>),
    #[error("seats not in auditorium {auditorium_id}: {}", fmt_seats(.seats))]
    SeatsOutsideAuditorium {
        auditorium_id: AuditoriumId,
        seats: Vec<Seat>,
    },
    #[error("showtime {id} already started at {starts_at}")]
    ShowtimeInPast { id: Ulid, starts_at: Ms },
    #[error("invalid auditorium layout: {0}")]
    InvalidLayout(&'static str),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),

    #[error("seats unavailable for showtime {showtime_id}: {}", fmt_seats(.seats))]
    SeatsUnavailable { showtime_id: Ulid, seats: Vec<Seat> },
    #[error("reservation {0} already confirmed")]
    AlreadyConfirmed(Ulid),
    #[error("reservation {id} expired at {expired_at}")]
    ReservationExpired { id: Ulid, expired_at: Ms },
    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::ShowtimeNotFound(_)
            | EngineError::ReservationNotFound(_)
            | EngineError::AuditoriumNotFound(_)
            | EngineError::MovieNotFound(_) => ErrorKind::NotFound,
            EngineError::NoSeatsRequested
            | EngineError::DuplicateSeat(_)
            | EngineError::SeatsNotContiguous(_)
            | EngineError::SeatsOutsideAuditorium { .. }
            | EngineError::ShowtimeInPast { .. }
            | EngineError::InvalidLayout(_)
            | EngineError::LimitExceeded(_) => ErrorKind::InvalidRequest,
            EngineError::SeatsUnavailable { .. }
            | EngineError::AlreadyConfirmed(_)
            | EngineError::ReservationExpired { .. }
            | EngineError::AlreadyExists(_) => ErrorKind::Conflict,
            EngineError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Only transient store failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Storage
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(what) => EngineError::AlreadyExists(what),
            StoreError::Full(what) => EngineError::LimitExceeded(what),
            other => EngineError::Storage(other.to_string()),
        }
    }
}
