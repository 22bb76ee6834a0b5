//! Host configuration from `BOXOFFICE_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::limits::{MAX_ROWS, MAX_SEATS_PER_ROW};
use crate::model::AuditoriumId;

pub const DEFAULT_AUDITORIUMS: &str = "1:28x22,2:21x18,3:15x21";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?}")]
    Invalid { var: &'static str, value: String },
    #[error("BOXOFFICE_AUDITORIUMS: bad entry {0:?}, expected id:ROWSxSEATS")]
    BadAuditorium(String),
    #[error("BOXOFFICE_AUDITORIUMS: auditorium {0} listed twice")]
    DuplicateAuditorium(AuditoriumId),
}

/// Rectangular auditorium the host creates on startup if it is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditoriumSeed {
    pub id: AuditoriumId,
    pub rows: u16,
    pub seats_per_row: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub sweep_interval: Duration,
    pub compact_threshold: u64,
    pub movie_cache_ttl: Duration,
    /// JSON array of movies showtimes can be scheduled for.
    pub movies_file: Option<PathBuf>,
    pub auditoriums: Vec<AuditoriumSeed>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; unset variables take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_dir = lookup("BOXOFFICE_DATA_DIR").unwrap_or_else(|| "./data".into());
        let metrics_port = match lookup("BOXOFFICE_METRICS_PORT") {
            Some(v) => Some(parse("BOXOFFICE_METRICS_PORT", &v)?),
            None => None,
        };
        let sweep_secs: u64 = parse_or(&lookup, "BOXOFFICE_SWEEP_INTERVAL_SECS", 5)?;
        let compact_threshold = parse_or(&lookup, "BOXOFFICE_COMPACT_THRESHOLD", 1000)?;
        let ttl_secs: u64 = parse_or(&lookup, "BOXOFFICE_MOVIE_CACHE_TTL_SECS", 3600)?;
        let auditoriums = parse_auditoriums(
            &lookup("BOXOFFICE_AUDITORIUMS").unwrap_or_else(|| DEFAULT_AUDITORIUMS.into()),
        )?;

        if sweep_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "BOXOFFICE_SWEEP_INTERVAL_SECS",
                value: "0".into(),
            });
        }

        Ok(Self {
            data_dir: PathBuf::from(data_dir),
            metrics_port,
            sweep_interval: Duration::from_secs(sweep_secs),
            compact_threshold,
            movie_cache_ttl: Duration::from_secs(ttl_secs),
            movies_file: lookup("BOXOFFICE_MOVIES_FILE").map(PathBuf::from),
            auditoriums,
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("boxoffice.wal")
    }
}

fn parse<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        var,
        value: value.to_string(),
    })
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        Some(v) => parse(var, &v),
        None => Ok(default),
    }
}

/// Parse `1:28x22,2:21x18` into seeds. Empty input means no auditoriums.
pub fn parse_auditoriums(raw: &str) -> Result<Vec<AuditoriumSeed>, ConfigError> {
    let mut seeds: Vec<AuditoriumSeed> = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let bad = || ConfigError::BadAuditorium(entry.to_string());
        let (id, dims) = entry.split_once(':').ok_or_else(bad)?;
        let (rows, per_row) = dims.split_once(['x', 'X']).ok_or_else(bad)?;
        let seed = AuditoriumSeed {
            id: id.trim().parse().map_err(|_| bad())?,
            rows: rows.trim().parse().map_err(|_| bad())?,
            seats_per_row: per_row.trim().parse().map_err(|_| bad())?,
        };
        if seed.rows == 0
            || seed.seats_per_row == 0
            || seed.rows > MAX_ROWS
            || seed.seats_per_row > MAX_SEATS_PER_ROW
        {
            return Err(bad());
        }
        if seeds.iter().any(|s| s.id == seed.id) {
            return Err(ConfigError::DuplicateAuditorium(seed.id));
        }
        seeds.push(seed);
    }
    Ok(seeds)
}
