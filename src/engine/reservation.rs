use ulid::Ulid;

use crate::model::*;
use crate::notify::SeatEvent;
use crate::observability::{CONFIRMATIONS_TOTAL, RESERVATIONS_TOTAL, RESERVED_SEATS, outcome_label};

use super::contiguity::normalize_seats;
use super::{Engine, EngineError};

impl Engine {
    /// Hold a contiguous run of seats for `HOLD_DURATION_MS`.
    ///
    /// Checks run cheapest first: request shape, showtime and auditorium,
    /// start time, then availability under the showtime lock. The returned
    /// ticket is unpaid with `created_at = now`.
    pub async fn reserve(&self, showtime_id: Ulid, seats: &[Seat]) -> Result<Ticket, EngineError> {
        let result = self.reserve_inner(showtime_id, seats).await;
        metrics::counter!(RESERVATIONS_TOTAL, "outcome" => outcome_label(&result)).increment(1);
        result
    }

    async fn reserve_inner(&self, showtime_id: Ulid, seats: &[Seat]) -> Result<Ticket, EngineError> {
        let seats = normalize_seats(seats)?;
        let (showtime, auditorium) = self.showtime_with_auditorium(showtime_id).await?;

        let outside: Vec<Seat> = seats
            .iter()
            .filter(|s| !auditorium.contains(s))
            .copied()
            .collect();
        if !outside.is_empty() {
            return Err(EngineError::SeatsOutsideAuditorium {
                auditorium_id: auditorium.id,
                seats: outside,
            });
        }

        let _guard = self.lock_showtime(showtime_id).await;
        let now = self.now();
        if showtime.has_started(now) {
            return Err(EngineError::ShowtimeInPast {
                id: showtime_id,
                starts_at: showtime.starts_at,
            });
        }

        let occupied = self.occupancy_locked(showtime_id, now).await?;
        let taken: Vec<Seat> = seats
            .iter()
            .filter(|s| occupied.contains(s))
            .copied()
            .collect();
        if !taken.is_empty() {
            return Err(EngineError::SeatsUnavailable {
                showtime_id,
                seats: taken,
            });
        }

        let ticket = self
            .tickets
            .insert_ticket(Ticket {
                id: Ulid::new(),
                showtime_id,
                seats,
                created_at: now,
                paid: false,
            })
            .await?;

        metrics::histogram!(RESERVED_SEATS).record(ticket.seats.len() as f64);
        tracing::info!(
            "hold {} on showtime {showtime_id}: {}",
            ticket.id,
            fmt_seats(&ticket.seats)
        );
        self.notify.send(
            showtime_id,
            SeatEvent::Held {
                ticket_id: ticket.id,
                seats: ticket.seats.clone(),
            },
        );
        Ok(ticket)
    }

    /// Turn a live hold into a paid ticket.
    ///
    /// The state is re-read under the showtime lock, so a confirm racing a
    /// sweep either pays the hold or reports it expired, never both.
    pub async fn confirm(&self, ticket_id: Ulid) -> Result<Ticket, EngineError> {
        let result = self.confirm_inner(ticket_id).await;
        metrics::counter!(CONFIRMATIONS_TOTAL, "outcome" => outcome_label(&result)).increment(1);
        result
    }

    async fn confirm_inner(&self, ticket_id: Ulid) -> Result<Ticket, EngineError> {
        let showtime_id = match self.tickets.get_ticket(ticket_id).await? {
            Some(ticket) => ticket.showtime_id,
            None => return Err(self.missing_reservation(ticket_id)),
        };

        let _guard = self.lock_showtime(showtime_id).await;
        let Some(mut ticket) = self.tickets.get_ticket(ticket_id).await? else {
            return Err(self.missing_reservation(ticket_id));
        };

        match ticket.state(self.now()) {
            TicketState::Paid => Err(EngineError::AlreadyConfirmed(ticket_id)),
            TicketState::Expired => Err(EngineError::ReservationExpired {
                id: ticket_id,
                expired_at: ticket.expires_at(),
            }),
            TicketState::Held => {
                ticket.paid = true;
                self.tickets.update_ticket(&ticket).await?;
                tracing::info!("ticket {ticket_id} paid on showtime {showtime_id}");
                self.notify.send(
                    showtime_id,
                    SeatEvent::Sold {
                        ticket_id,
                        seats: ticket.seats.clone(),
                    },
                );
                Ok(ticket)
            }
        }
    }
}
