use std::sync::Arc;

use tracing::info;

use boxoffice::cache::MemoryCache;
use boxoffice::clock::SystemClock;
use boxoffice::config::Config;
use boxoffice::engine::Engine;
use boxoffice::movies::StaticMovieDirectory;
use boxoffice::reaper;
use boxoffice::store::{MemoryStore, ShowtimeCatalog};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    boxoffice::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;
    let wal_path = config.wal_path();
    let store = Arc::new(MemoryStore::open(&wal_path)?);

    let movies = match &config.movies_file {
        Some(path) => StaticMovieDirectory::load(path)?,
        None => {
            tracing::warn!("BOXOFFICE_MOVIES_FILE not set, no showtime can be scheduled");
            StaticMovieDirectory::default()
        }
    };
    let movie_count = movies.len();

    let engine = Arc::new(Engine::new(store.clone(), Arc::new(SystemClock)).with_movies(
        Arc::new(movies),
        Arc::new(MemoryCache::new()),
        config.movie_cache_ttl,
    ));

    for seed in &config.auditoriums {
        if let Some(existing) = store.get_auditorium(seed.id).await? {
            let wanted = seed.rows as usize * seed.seats_per_row as usize;
            if existing.seat_count() != wanted {
                tracing::warn!(
                    "auditorium {} already exists with {} seats, not {wanted}; keeping it",
                    seed.id,
                    existing.seat_count()
                );
            }
            continue;
        }
        engine
            .provision_auditorium(seed.id, seed.rows, seed.seats_per_row)
            .await?;
    }

    info!("boxoffice started");
    info!("  wal: {}", wal_path.display());
    info!("  movies: {movie_count}");
    info!("  sweep interval: {:?}", config.sweep_interval);
    info!("  compact threshold: {}", config.compact_threshold);
    info!("  metrics: {}", config.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    let sweeper = tokio::spawn(reaper::run_sweeper(engine.clone(), config.sweep_interval));
    let compactor = tokio::spawn(reaper::run_compactor(store.clone(), config.compact_threshold));

    shutdown_signal().await?;
    info!("shutdown signal received, stopping background tasks");
    sweeper.abort();
    compactor.abort();

    if let Err(e) = store.compact().await {
        tracing::warn!("final compaction failed: {e}");
    }
    info!("boxoffice stopped");
    Ok(())
}

/// Resolve on ctrl-c, or SIGTERM on unix.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = sigterm.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
