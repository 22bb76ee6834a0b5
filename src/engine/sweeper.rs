use std::collections::BTreeSet;

use futures::stream::{self, StreamExt};
use ulid::Ulid;

use crate::limits::TOMBSTONE_RETENTION_MS;
use crate::model::*;
use crate::notify::SeatEvent;
use crate::observability::HOLDS_RECLAIMED_TOTAL;
use crate::store::TicketFilter;

use super::availability::occupied_seats;
use super::{Engine, EngineError};

/// Showtimes swept in parallel by one `sweep_all` pass.
const SWEEP_CONCURRENCY: usize = 8;

impl Engine {
    /// Seats occupied at `now`, reclaiming expired holds on the way.
    /// Caller must hold the showtime lock.
    pub(super) async fn occupancy_locked(
        &self,
        showtime_id: Ulid,
        now: Ms,
    ) -> Result<BTreeSet<Seat>, EngineError> {
        let tickets = self.tickets.list_tickets(showtime_id, TicketFilter::All).await?;
        let (expired, live): (Vec<Ticket>, Vec<Ticket>) =
            tickets.into_iter().partition(|t| t.is_expired(now));
        // The answer comes from `live` either way; a failed delete is retried on the next read.
        if !expired.is_empty()
            && let Err(e) = self.reclaim_locked(showtime_id, &expired).await
        {
            tracing::warn!("inline reclaim on showtime {showtime_id} failed: {e}");
        }
        Ok(occupied_seats(&live, now))
    }

    async fn reclaim_locked(&self, showtime_id: Ulid, expired: &[Ticket]) -> Result<(), EngineError> {
        self.tickets.delete_tickets(expired).await?;
        for ticket in expired {
            self.reclaimed.insert(ticket.id, ticket.expires_at());
            tracing::info!("reclaimed expired hold {} on showtime {showtime_id}", ticket.id);
            self.notify.send(
                showtime_id,
                SeatEvent::Released {
                    ticket_id: ticket.id,
                    seats: ticket.seats.clone(),
                },
            );
        }
        metrics::counter!(HOLDS_RECLAIMED_TOTAL).increment(expired.len() as u64);
        Ok(())
    }

    /// Delete every expired hold of one showtime and return what was reclaimed.
    /// Paid tickets and live holds are never touched.
    pub async fn sweep_showtime(&self, showtime_id: Ulid) -> Result<Vec<Ticket>, EngineError> {
        // Only known showtimes get a lock entry.
        self.get_showtime(showtime_id).await?;
        let _guard = self.lock_showtime(showtime_id).await;
        let now = self.now();
        let expired = self
            .tickets
            .list_tickets(showtime_id, TicketFilter::Reclaimable { now })
            .await?;
        if !expired.is_empty() {
            self.reclaim_locked(showtime_id, &expired).await?;
        }
        Ok(expired)
    }

    /// One sweeper pass over all showtimes. Returns how many holds were reclaimed.
    /// A failing showtime is logged and skipped. Also drops old tombstones,
    /// abandoned seat channels and expired movie cache entries.
    pub async fn sweep_all(&self) -> Result<usize, EngineError> {
        let showtimes = self.catalog.list_showtimes().await?;
        let reclaimed = stream::iter(showtimes)
            .map(|showtime| async move {
                match self.sweep_showtime(showtime.id).await {
                    Ok(tickets) => tickets.len(),
                    Err(e) => {
                        tracing::warn!("sweep of showtime {} failed: {e}", showtime.id);
                        0
                    }
                }
            })
            .buffer_unordered(SWEEP_CONCURRENCY)
            .fold(0, |total, n| async move { total + n })
            .await;

        self.prune_tombstones();
        self.notify.prune();
        self.cache.purge_expired().await;
        Ok(reclaimed)
    }

    fn prune_tombstones(&self) {
        let cutoff = self.now() - TOMBSTONE_RETENTION_MS;
        self.reclaimed.retain(|_, expired_at| *expired_at > cutoff);
    }

    /// Reclaimed hold ids still remembered for `ReservationExpired` answers.
    pub fn tombstone_count(&self) -> usize {
        self.reclaimed.len()
    }
}
