use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::seatmap::Auditorium;

/// Unix milliseconds. Every timestamp in the crate uses it.
pub type Ms = i64;

/// Numbered screen inside the cinema.
pub type AuditoriumId = u32;

/// How long an unpaid ticket keeps its seats: 10 minutes from creation.
pub const HOLD_DURATION_MS: Ms = 10 * 60_000;

/// A seat addressed by coordinates. Rows and numbers start at 1.
///
/// Field order matters: the derived `Ord` sorts by row, then number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Seat {
    pub row: u16,
    pub number: u16,
}

impl Seat {
    pub const fn new(row: u16, number: u16) -> Self {
        Self { row, number }
    }

    /// True if `next` sits directly to the right of `self` in the same row.
    pub fn is_followed_by(&self, next: &Seat) -> bool {
        self.row == next.row && self.number.checked_add(1) == Some(next.number)
    }
}

impl fmt::Display for Seat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.row, self.number)
    }
}

/// Render a seat list as `(1,3) (1,4)` for error messages and logs.
pub fn fmt_seats(seats: &[Seat]) -> String {
    seats
        .iter()
        .map(Seat::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Movie reference attached to a showtime. Metadata beyond this is not ours.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movie {
    pub id: String,
    pub title: String,
    pub year: Option<u16>,
    pub stars: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Showtime {
    pub id: Ulid,
    pub movie: Movie,
    pub starts_at: Ms,
    pub auditorium_id: AuditoriumId,
}

impl Showtime {
    pub fn has_started(&self, now: Ms) -> bool {
        self.starts_at <= now
    }
}

/// A reservation of one contiguous seat run for one showtime.
/// Unpaid it is a hold; paid it is a sold ticket and never reclaimed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Ulid,
    pub showtime_id: Ulid,
    /// Sorted by (row, number), never empty.
    pub seats: Vec<Seat>,
    pub created_at: Ms,
    pub paid: bool,
}

impl Ticket {
    pub fn expires_at(&self) -> Ms {
        self.created_at + HOLD_DURATION_MS
    }

    /// Unpaid and past the hold window. Exactly at the window edge it still holds.
    pub fn is_expired(&self, now: Ms) -> bool {
        !self.paid && now - self.created_at > HOLD_DURATION_MS
    }

    /// Whether this ticket makes its seats unavailable at `now`.
    pub fn occupies(&self, now: Ms) -> bool {
        !self.is_expired(now)
    }

    pub fn state(&self, now: Ms) -> TicketState {
        if self.paid {
            TicketState::Paid
        } else if self.is_expired(now) {
            TicketState::Expired
        } else {
            TicketState::Held
        }
    }
}

/// Lifecycle: `Held -> Paid` on confirmation, `Held -> Expired` once the window lapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketState {
    Held,
    Paid,
    Expired,
}

/// WAL record format. One variant per state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    AuditoriumProvisioned {
        auditorium: Auditorium,
    },
    ShowtimeScheduled {
        showtime: Showtime,
    },
    TicketReserved {
        ticket: Ticket,
    },
    TicketPaid {
        id: Ulid,
        showtime_id: Ulid,
    },
    TicketsReclaimed {
        showtime_id: Ulid,
        ids: Vec<Ulid>,
    },
}
