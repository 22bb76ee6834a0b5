use std::io;
use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::seatmap::Auditorium;

use super::wal::Wal;
use super::writer::WalHandle;
use super::{ShowtimeCatalog, StoreError, TicketFilter, TicketStore};

/// What to do to take an applied event back out of memory.
enum Undo {
    Nothing,
    RemoveAuditorium(AuditoriumId),
    RemoveShowtime(Ulid),
    RemoveTicket(Ulid),
    Unpay(Ulid),
    Restore(Vec<Ticket>),
}

/// Catalog and tickets held in concurrent maps, optionally backed by a WAL.
pub struct MemoryStore {
    auditoriums: DashMap<AuditoriumId, Auditorium>,
    showtimes: DashMap<Ulid, Showtime>,
    tickets: DashMap<Ulid, Ticket>,
    /// Showtime -> its ticket ids.
    by_showtime: DashMap<Ulid, Vec<Ulid>>,
    wal: Option<WalHandle>,
    /// Shared by every commit, exclusive during compaction, so a snapshot
    /// never misses an event that is already in the log.
    commit_gate: RwLock<()>,
    /// Serializes the check-then-insert of catalog writes.
    catalog_writes: Mutex<()>,
    #[cfg(test)]
    faults: Option<super::wal::FaultQueue>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Ephemeral store: nothing survives the process.
    pub fn new() -> Self {
        Self {
            auditoriums: DashMap::new(),
            showtimes: DashMap::new(),
            tickets: DashMap::new(),
            by_showtime: DashMap::new(),
            wal: None,
            commit_gate: RwLock::new(()),
            catalog_writes: Mutex::new(()),
            #[cfg(test)]
            faults: None,
        }
    }

    /// Durable store: replay the log at `path`, then append to it.
    /// Must be called inside a tokio runtime (spawns the writer task).
    pub fn open(path: &Path) -> io::Result<Self> {
        let replay = Wal::replay(path)?;
        if replay.discarded_tail {
            warn!(
                "discarding torn WAL tail of {} after offset {}",
                path.display(),
                replay.valid_len
            );
        }
        let mut store = Self::new();
        for event in &replay.events {
            store.apply(event);
        }
        let wal = Wal::open(path, replay.valid_len)?;
        #[cfg(test)]
        {
            store.faults = Some(wal.faults());
        }
        store.wal = Some(WalHandle::spawn(wal));
        info!(
            "replayed {} events from {} ({} tickets)",
            replay.events.len(),
            path.display(),
            store.tickets.len()
        );
        Ok(store)
    }

    pub fn is_durable(&self) -> bool {
        self.wal.is_some()
    }

    pub fn ticket_count(&self) -> usize {
        self.tickets.len()
    }

    /// Make the next log operations of these kinds fail, in order.
    #[cfg(test)]
    pub(crate) fn inject_faults(&self, faults: &[super::Fault]) {
        if let Some(queue) = &self.faults {
            queue.lock().unwrap().extend(faults.iter().copied());
        }
    }

    /// Apply in memory and append to the log; revert memory if the log write fails.
    /// The writer cuts a failed batch back out of the file before answering, so
    /// after an error neither memory nor the log holds the event.
    ///
    /// Cancellation before the writer slot is reserved changes nothing. After that
    /// point the event is applied and queued without awaiting, so memory and log agree.
    async fn commit(&self, event: Event) -> Result<(), StoreError> {
        let _gate = self.commit_gate.read().await;
        let Some(wal) = &self.wal else {
            self.apply(&event);
            return Ok(());
        };
        let slot = wal.reserve().await?;
        let undo = self.apply(&event);
        let pending = slot.send(event);
        if let Err(e) = pending.durable().await {
            self.revert(undo);
            return Err(e);
        }
        Ok(())
    }

    fn apply(&self, event: &Event) -> Undo {
        match event {
            Event::AuditoriumProvisioned { auditorium } => {
                self.auditoriums.insert(auditorium.id, auditorium.clone());
                Undo::RemoveAuditorium(auditorium.id)
            }
            Event::ShowtimeScheduled { showtime } => {
                self.showtimes.insert(showtime.id, showtime.clone());
                Undo::RemoveShowtime(showtime.id)
            }
            Event::TicketReserved { ticket } => {
                if self.tickets.insert(ticket.id, ticket.clone()).is_none() {
                    self.by_showtime.entry(ticket.showtime_id).or_default().push(ticket.id);
                }
                Undo::RemoveTicket(ticket.id)
            }
            Event::TicketPaid { id, .. } => match self.tickets.get_mut(id) {
                Some(mut t) if !t.paid => {
                    t.paid = true;
                    Undo::Unpay(*id)
                }
                _ => Undo::Nothing,
            },
            Event::TicketsReclaimed { showtime_id, ids } => {
                let removed: Vec<Ticket> = ids
                    .iter()
                    .filter_map(|id| self.tickets.remove(id).map(|(_, t)| t))
                    .collect();
                if let Some(mut index) = self.by_showtime.get_mut(showtime_id) {
                    index.retain(|id| !ids.contains(id));
                }
                Undo::Restore(removed)
            }
        }
    }

    fn revert(&self, undo: Undo) {
        match undo {
            Undo::Nothing => {}
            Undo::RemoveAuditorium(id) => {
                self.auditoriums.remove(&id);
            }
            Undo::RemoveShowtime(id) => {
                self.showtimes.remove(&id);
            }
            Undo::RemoveTicket(id) => {
                if let Some((_, t)) = self.tickets.remove(&id)
                    && let Some(mut index) = self.by_showtime.get_mut(&t.showtime_id)
                {
                    index.retain(|tid| *tid != id);
                }
            }
            Undo::Unpay(id) => {
                if let Some(mut t) = self.tickets.get_mut(&id) {
                    t.paid = false;
                }
            }
            Undo::Restore(tickets) => {
                for ticket in tickets {
                    self.by_showtime.entry(ticket.showtime_id).or_default().push(ticket.id);
                    self.tickets.insert(ticket.id, ticket);
                }
            }
        }
    }

    /// Minimal event list that recreates the current state.
    pub fn snapshot(&self) -> Vec<Event> {
        let mut auditoriums: Vec<Auditorium> =
            self.auditoriums.iter().map(|e| e.value().clone()).collect();
        auditoriums.sort_by_key(|a| a.id);
        let mut showtimes: Vec<Showtime> =
            self.showtimes.iter().map(|e| e.value().clone()).collect();
        showtimes.sort_by_key(|s| s.id);
        let mut tickets: Vec<Ticket> = self.tickets.iter().map(|e| e.value().clone()).collect();
        tickets.sort_by_key(|t| (t.created_at, t.id));

        let mut events = Vec::with_capacity(auditoriums.len() + showtimes.len() + tickets.len());
        events.extend(auditoriums.into_iter().map(|auditorium| Event::AuditoriumProvisioned { auditorium }));
        events.extend(showtimes.into_iter().map(|showtime| Event::ShowtimeScheduled { showtime }));
        // Paid tickets carry their flag; no separate TicketPaid needed.
        events.extend(tickets.into_iter().map(|ticket| Event::TicketReserved { ticket }));
        events
    }

    /// Rewrite the log as `snapshot()`. No-op for an ephemeral store.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let Some(wal) = &self.wal else {
            return Ok(());
        };
        let _gate = self.commit_gate.write().await;
        let events = self.snapshot();
        let count = events.len();
        wal.compact(events).await?;
        info!("compacted WAL to {count} events");
        Ok(())
    }

    pub async fn appends_since_compact(&self) -> u64 {
        match &self.wal {
            Some(wal) => wal.appends_since_compact().await,
            None => 0,
        }
    }
}

#[async_trait]
impl ShowtimeCatalog for MemoryStore {
    async fn get_showtime(&self, id: Ulid) -> Result<Option<Showtime>, StoreError> {
        Ok(self.showtimes.get(&id).map(|e| e.value().clone()))
    }

    async fn get_showtime_with_auditorium(
        &self,
        id: Ulid,
    ) -> Result<Option<(Showtime, Auditorium)>, StoreError> {
        let Some(showtime) = self.showtimes.get(&id).map(|e| e.value().clone()) else {
            return Ok(None);
        };
        let auditorium = self
            .auditoriums
            .get(&showtime.auditorium_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| StoreError::Missing(format!("auditorium {}", showtime.auditorium_id)))?;
        Ok(Some((showtime, auditorium)))
    }

    async fn get_auditorium(&self, id: AuditoriumId) -> Result<Option<Auditorium>, StoreError> {
        Ok(self.auditoriums.get(&id).map(|e| e.value().clone()))
    }

    async fn get_seats(&self, auditorium_id: AuditoriumId) -> Result<Option<Vec<Seat>>, StoreError> {
        Ok(self.auditoriums.get(&auditorium_id).map(|e| e.value().seats()))
    }

    async fn list_showtimes(&self) -> Result<Vec<Showtime>, StoreError> {
        let mut showtimes: Vec<Showtime> =
            self.showtimes.iter().map(|e| e.value().clone()).collect();
        showtimes.sort_by_key(|s| (s.starts_at, s.id));
        Ok(showtimes)
    }

    async fn insert_auditorium(&self, auditorium: Auditorium) -> Result<(), StoreError> {
        let _writes = self.catalog_writes.lock().await;
        if self.auditoriums.contains_key(&auditorium.id) {
            return Err(StoreError::Duplicate(format!("auditorium {}", auditorium.id)));
        }
        if self.auditoriums.len() >= MAX_AUDITORIUMS {
            return Err(StoreError::Full("too many auditoriums"));
        }
        self.commit(Event::AuditoriumProvisioned { auditorium }).await
    }

    async fn insert_showtime(&self, showtime: Showtime) -> Result<(), StoreError> {
        let _writes = self.catalog_writes.lock().await;
        if self.showtimes.contains_key(&showtime.id) {
            return Err(StoreError::Duplicate(format!("showtime {}", showtime.id)));
        }
        if !self.auditoriums.contains_key(&showtime.auditorium_id) {
            return Err(StoreError::Missing(format!("auditorium {}", showtime.auditorium_id)));
        }
        if self.showtimes.len() >= MAX_SHOWTIMES {
            return Err(StoreError::Full("too many showtimes"));
        }
        self.commit(Event::ShowtimeScheduled { showtime }).await
    }
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn insert_ticket(&self, ticket: Ticket) -> Result<Ticket, StoreError> {
        if self.tickets.contains_key(&ticket.id) {
            return Err(StoreError::Duplicate(format!("ticket {}", ticket.id)));
        }
        if !self.showtimes.contains_key(&ticket.showtime_id) {
            return Err(StoreError::Missing(format!("showtime {}", ticket.showtime_id)));
        }
        let per_showtime = self.by_showtime.get(&ticket.showtime_id).map_or(0, |ids| ids.len());
        if per_showtime >= MAX_TICKETS_PER_SHOWTIME {
            return Err(StoreError::Full("too many tickets for showtime"));
        }
        self.commit(Event::TicketReserved { ticket: ticket.clone() }).await?;
        Ok(ticket)
    }

    async fn get_ticket(&self, id: Ulid) -> Result<Option<Ticket>, StoreError> {
        Ok(self.tickets.get(&id).map(|e| e.value().clone()))
    }

    async fn list_tickets(
        &self,
        showtime_id: Ulid,
        filter: TicketFilter,
    ) -> Result<Vec<Ticket>, StoreError> {
        let ids = self
            .by_showtime
            .get(&showtime_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        let mut tickets: Vec<Ticket> = ids
            .iter()
            .filter_map(|id| self.tickets.get(id).map(|e| e.value().clone()))
            .filter(|t| filter.matches(t))
            .collect();
        tickets.sort_by_key(|t| (t.created_at, t.id));
        Ok(tickets)
    }

    async fn update_ticket(&self, ticket: &Ticket) -> Result<(), StoreError> {
        let stored = self
            .tickets
            .get(&ticket.id)
            .map(|e| e.value().clone())
            .ok_or_else(|| StoreError::Missing(format!("ticket {}", ticket.id)))?;
        if stored.seats != ticket.seats
            || stored.showtime_id != ticket.showtime_id
            || stored.created_at != ticket.created_at
        {
            return Err(StoreError::Rejected("only the paid flag of a ticket can change"));
        }
        match (stored.paid, ticket.paid) {
            (false, true) => {
                self.commit(Event::TicketPaid {
                    id: ticket.id,
                    showtime_id: ticket.showtime_id,
                })
                .await
            }
            (true, false) => Err(StoreError::Rejected("a paid ticket cannot be unpaid")),
            _ => Ok(()),
        }
    }

    async fn delete_tickets(&self, tickets: &[Ticket]) -> Result<(), StoreError> {
        let mut grouped: Vec<(Ulid, Vec<Ulid>)> = Vec::new();
        for t in tickets {
            match grouped.iter_mut().find(|(sid, _)| *sid == t.showtime_id) {
                Some((_, ids)) => ids.push(t.id),
                None => grouped.push((t.showtime_id, vec![t.id])),
            }
        }
        for (showtime_id, ids) in grouped {
            self.commit(Event::TicketsReclaimed { showtime_id, ids }).await?;
        }
        Ok(())
    }
}
