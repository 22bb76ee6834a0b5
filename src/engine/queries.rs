use ulid::Ulid;

use crate::model::*;
use crate::store::TicketFilter;

use super::{Engine, EngineError};

impl Engine {
    pub async fn get_showtime(&self, showtime_id: Ulid) -> Result<Showtime, EngineError> {
        self.catalog
            .get_showtime(showtime_id)
            .await?
            .ok_or(EngineError::ShowtimeNotFound(showtime_id))
    }

    pub async fn list_showtimes(&self) -> Result<Vec<Showtime>, EngineError> {
        Ok(self.catalog.list_showtimes().await?)
    }

    /// Every seat of the showtime's auditorium, taken or not, row-major.
    pub async fn seat_map(&self, showtime_id: Ulid) -> Result<Vec<Seat>, EngineError> {
        let showtime = self.get_showtime(showtime_id).await?;
        self.catalog
            .get_seats(showtime.auditorium_id)
            .await?
            .ok_or(EngineError::AuditoriumNotFound(showtime.auditorium_id))
    }

    /// Look up a ticket. An unpaid hold past its window reports
    /// `ReservationExpired` whether or not a sweep already deleted it.
    pub async fn get_reservation(&self, ticket_id: Ulid) -> Result<Ticket, EngineError> {
        let Some(ticket) = self.tickets.get_ticket(ticket_id).await? else {
            return Err(self.missing_reservation(ticket_id));
        };
        if ticket.is_expired(self.now()) {
            return Err(EngineError::ReservationExpired {
                id: ticket_id,
                expired_at: ticket.expires_at(),
            });
        }
        Ok(ticket)
    }

    /// Stored tickets of a showtime in creation order, including expired holds
    /// no sweep has reclaimed yet.
    pub async fn tickets_for_showtime(&self, showtime_id: Ulid) -> Result<Vec<Ticket>, EngineError> {
        self.get_showtime(showtime_id).await?;
        Ok(self.tickets.list_tickets(showtime_id, TicketFilter::All).await?)
    }
}
