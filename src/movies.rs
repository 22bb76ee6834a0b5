use std::io;
use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::model::Movie;
use crate::store::StoreError;

/// Opaque movie metadata source. The engine only needs id and title back.
#[async_trait]
pub trait MovieDirectory: Send + Sync {
    /// Look a movie up by id or title. `None` if the directory does not know it.
    async fn find_movie(&self, query: &str) -> Result<Option<Movie>, StoreError>;
}

/// Directory backed by a fixed in-process list.
#[derive(Debug, Default)]
pub struct StaticMovieDirectory {
    by_id: DashMap<String, Movie>,
    /// Lowercased title -> id.
    by_title: DashMap<String, String>,
}

impl StaticMovieDirectory {
    pub fn new(movies: impl IntoIterator<Item = Movie>) -> Self {
        let directory = Self::default();
        for movie in movies {
            directory.add(movie);
        }
        directory
    }

    /// Parse a JSON array of movies.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        let movies: Vec<Movie> = serde_json::from_str(raw)?;
        Ok(Self::new(movies))
    }

    /// Read a JSON array of movies from `path`.
    pub fn load(path: &Path) -> io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("{}: {e}", path.display()))
        })
    }

    pub fn add(&self, movie: Movie) {
        self.by_title.insert(movie.title.to_lowercase(), movie.id.clone());
        self.by_id.insert(movie.id.clone(), movie);
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[async_trait]
impl MovieDirectory for StaticMovieDirectory {
    async fn find_movie(&self, query: &str) -> Result<Option<Movie>, StoreError> {
        if let Some(movie) = self.by_id.get(query) {
            return Ok(Some(movie.value().clone()));
        }
        let id = self
            .by_title
            .get(&query.trim().to_lowercase())
            .map(|e| e.value().clone());
        Ok(id.and_then(|id| self.by_id.get(&id).map(|m| m.value().clone())))
    }
}
