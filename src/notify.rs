use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Seat;

const CHANNEL_CAPACITY: usize = 256;

/// Seat map change for one showtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeatEvent {
    /// A new unpaid hold took these seats.
    Held { ticket_id: Ulid, seats: Vec<Seat> },
    /// A hold was paid; the seats are sold for good.
    Sold { ticket_id: Ulid, seats: Vec<Seat> },
    /// An expired hold was reclaimed; the seats are free again.
    Released { ticket_id: Ulid, seats: Vec<Seat> },
}

/// Broadcast hub keyed by showtime, for live seat maps.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<SeatEvent>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to seat changes of a showtime. Creates the channel if needed.
    pub fn subscribe(&self, showtime_id: Ulid) -> broadcast::Receiver<SeatEvent> {
        let sender = self
            .channels
            .entry(showtime_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, showtime_id: Ulid, event: SeatEvent) {
        if let Some(sender) = self.channels.get(&showtime_id) {
            let _ = sender.send(event);
        }
    }

    /// Drop channels whose subscribers have all gone away.
    pub fn prune(&self) {
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
