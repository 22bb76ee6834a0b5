use ulid::Ulid;

use crate::cache::get_or_set;
use crate::limits::*;
use crate::model::*;
use crate::seatmap::Auditorium;

use super::{Engine, EngineError};

impl Engine {
    /// Register a rectangular auditorium of `rows` x `seats_per_row` seats.
    pub async fn provision_auditorium(
        &self,
        id: AuditoriumId,
        rows: u16,
        seats_per_row: u16,
    ) -> Result<Auditorium, EngineError> {
        let auditorium = Auditorium::grid(id, rows, seats_per_row)?;
        self.insert_auditorium(auditorium).await
    }

    /// Register an auditorium with an irregular seat list.
    pub async fn provision_auditorium_with_seats(
        &self,
        id: AuditoriumId,
        seats: Vec<Seat>,
    ) -> Result<Auditorium, EngineError> {
        let auditorium = Auditorium::explicit(id, seats)?;
        self.insert_auditorium(auditorium).await
    }

    async fn insert_auditorium(&self, auditorium: Auditorium) -> Result<Auditorium, EngineError> {
        self.catalog.insert_auditorium(auditorium.clone()).await?;
        tracing::info!(
            "auditorium {} provisioned with {} seats",
            auditorium.id,
            auditorium.seat_count()
        );
        Ok(auditorium)
    }

    /// Schedule a screening of the movie matching `movie_query` (id or title).
    ///
    /// The movie lookup goes through the cache; a miss falls back to the
    /// directory. Scheduling a start time that already passed is allowed,
    /// it just can't take reservations.
    pub async fn schedule_showtime(
        &self,
        movie_query: &str,
        auditorium_id: AuditoriumId,
        starts_at: Ms,
    ) -> Result<Showtime, EngineError> {
        let query = movie_query.trim();
        if query.len() > MAX_MOVIE_QUERY_LEN {
            return Err(EngineError::LimitExceeded("movie query too long"));
        }
        if query.is_empty() {
            return Err(EngineError::MovieNotFound(String::new()));
        }
        if self.catalog.get_auditorium(auditorium_id).await?.is_none() {
            return Err(EngineError::AuditoriumNotFound(auditorium_id));
        }

        let key = format!("movie:{}", query.to_lowercase());
        let movies = &self.movies;
        let movie: Movie = get_or_set(self.cache.as_ref(), &key, Some(self.movie_cache_ttl), move || async move {
            match movies.find_movie(query).await {
                Ok(Some(movie)) => Ok(movie),
                Ok(None) => Err(EngineError::MovieNotFound(query.to_string())),
                Err(e) => Err(EngineError::from(e)),
            }
        })
        .await?;

        let showtime = Showtime {
            id: Ulid::new(),
            movie,
            starts_at,
            auditorium_id,
        };
        self.catalog.insert_showtime(showtime.clone()).await?;
        tracing::info!(
            "showtime {} scheduled: {:?} in auditorium {} at {}",
            showtime.id,
            showtime.movie.title,
            auditorium_id,
            starts_at
        );
        Ok(showtime)
    }
}
