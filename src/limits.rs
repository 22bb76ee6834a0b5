//! Hard limits enforced by the engine. Requests beyond these are rejected
//! with `EngineError::LimitExceeded` before touching the store.

pub const MAX_AUDITORIUMS: usize = 1_000;
pub const MAX_ROWS: u16 = 200;
pub const MAX_SEATS_PER_ROW: u16 = 200;

pub const MAX_SHOWTIMES: usize = 100_000;
pub const MAX_TICKETS_PER_SHOWTIME: usize = 10_000;

/// A single hold may not cover more than one full row anyway; this caps it lower.
pub const MAX_SEATS_PER_RESERVATION: usize = 50;

pub const MAX_MOVIE_QUERY_LEN: usize = 200;

/// Reclaimed-hold tombstones older than this are dropped by the background sweep.
pub const TOMBSTONE_RETENTION_MS: i64 = 24 * 3_600_000;
