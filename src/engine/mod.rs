mod availability;
mod contiguity;
mod error;
mod mutations;
mod queries;
mod reservation;
mod sweeper;

pub use availability::{free_seats, occupied_seats};
pub use contiguity::normalize_seats;
pub use error::{EngineError, ErrorKind};

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use ulid::Ulid;

use crate::cache::{CacheService, MemoryCache};
use crate::clock::Clock;
use crate::model::*;
use crate::movies::{MovieDirectory, StaticMovieDirectory};
use crate::notify::NotifyHub;
use crate::seatmap::Auditorium;
use crate::store::{MemoryStore, ShowtimeCatalog, TicketStore};

pub const DEFAULT_MOVIE_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Seat reservation core: availability, holds, confirmation and expiry.
///
/// Every operation that reads tickets to decide on a write runs under the
/// showtime's lock, so two requests for the same showtime never interleave
/// their availability check and their insert.
pub struct Engine {
    catalog: Arc<dyn ShowtimeCatalog>,
    tickets: Arc<dyn TicketStore>,
    movies: Arc<dyn MovieDirectory>,
    cache: Arc<dyn CacheService>,
    clock: Arc<dyn Clock>,
    pub notify: Arc<NotifyHub>,
    movie_cache_ttl: Duration,
    showtime_locks: DashMap<Ulid, Arc<Mutex<()>>>,
    /// Holds reclaimed by a sweep: ticket id -> when it expired.
    reclaimed: DashMap<Ulid, Ms>,
}

impl Engine {
    /// Engine over a single store serving as both catalog and ticket store.
    pub fn new(store: Arc<MemoryStore>, clock: Arc<dyn Clock>) -> Self {
        Self::from_parts(store.clone(), store, clock)
    }

    pub fn from_parts(
        catalog: Arc<dyn ShowtimeCatalog>,
        tickets: Arc<dyn TicketStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog,
            tickets,
            movies: Arc::new(StaticMovieDirectory::default()),
            cache: Arc::new(MemoryCache::new()),
            clock,
            notify: Arc::new(NotifyHub::new()),
            movie_cache_ttl: DEFAULT_MOVIE_CACHE_TTL,
            showtime_locks: DashMap::new(),
            reclaimed: DashMap::new(),
        }
    }

    /// Use `movies` behind `cache` for showtime scheduling.
    pub fn with_movies(
        mut self,
        movies: Arc<dyn MovieDirectory>,
        cache: Arc<dyn CacheService>,
        ttl: Duration,
    ) -> Self {
        self.movies = movies;
        self.cache = cache;
        self.movie_cache_ttl = ttl;
        self
    }

    pub fn now(&self) -> Ms {
        self.clock.now_ms()
    }

    /// Serialize ticket decisions for one showtime. Dropping the guard (including
    /// by cancelling the caller) releases the showtime.
    async fn lock_showtime(&self, showtime_id: Ulid) -> OwnedMutexGuard<()> {
        let lock = self.showtime_locks.entry(showtime_id).or_default().clone();
        lock.lock_owned().await
    }

    async fn showtime_with_auditorium(
        &self,
        showtime_id: Ulid,
    ) -> Result<(Showtime, Auditorium), EngineError> {
        self.catalog
            .get_showtime_with_auditorium(showtime_id)
            .await?
            .ok_or(EngineError::ShowtimeNotFound(showtime_id))
    }

    /// Error for a ticket id the store no longer has: expired if we reclaimed it.
    fn missing_reservation(&self, ticket_id: Ulid) -> EngineError {
        match self.reclaimed.get(&ticket_id) {
            Some(expired_at) => EngineError::ReservationExpired {
                id: ticket_id,
                expired_at: *expired_at,
            },
            None => EngineError::ReservationNotFound(ticket_id),
        }
    }
}
