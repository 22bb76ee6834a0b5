use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::engine::Engine;
use crate::store::{MemoryStore, StoreError};

/// How often the compactor checks the append counter.
const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that reclaims expired holds across all showtimes.
pub async fn run_sweeper(engine: Arc<Engine>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        match engine.sweep_all().await {
            Ok(0) => {}
            Ok(n) => info!("swept {n} expired holds"),
            Err(e) => tracing::warn!("sweep failed: {e}"),
        }
    }
}

/// Background task that rewrites the WAL once enough appends piled up.
pub async fn run_compactor(store: Arc<MemoryStore>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_needed(&store, threshold).await {
            tracing::warn!("WAL compaction failed: {e}");
        }
    }
}

/// Compact when at least `threshold` events were appended since the last rewrite.
/// Returns whether a compaction ran.
pub async fn compact_if_needed(store: &MemoryStore, threshold: u64) -> Result<bool, StoreError> {
    let appends = store.appends_since_compact().await;
    if appends < threshold {
        return Ok(false);
    }
    tracing::debug!("compacting after {appends} appends");
    store.compact().await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::*;
    use std::path::PathBuf;

    const M: Ms = 60_000;
    const T0: Ms = 1_700_000_000_000;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("boxoffice_test_reaper");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_reclaims_in_background() {
        let clock = Arc::new(ManualClock::new(T0));
        let store = Arc::new(MemoryStore::new());
        let engine = Engine::new(store, clock.clone()).with_movies(
            Arc::new(crate::movies::StaticMovieDirectory::new([Movie {
                id: "tt0133093".into(),
                title: "The Matrix".into(),
                year: Some(1999),
                stars: None,
            }])),
            Arc::new(crate::cache::MemoryCache::new()),
            Duration::from_secs(60),
        );
        let engine = Arc::new(engine);
        engine.provision_auditorium(1, 2, 2).await.unwrap();
        let showtime = engine.schedule_showtime("The Matrix", 1, T0 + 60 * M).await.unwrap();
        let hold = engine.reserve(showtime.id, &[Seat::new(1, 1)]).await.unwrap();

        let task = tokio::spawn(run_sweeper(engine.clone(), Duration::from_secs(1)));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(engine.tickets_for_showtime(showtime.id).await.unwrap().len(), 1);

        clock.advance(11 * M);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(engine.tickets_for_showtime(showtime.id).await.unwrap().is_empty());
        assert!(matches!(
            engine.confirm(hold.id).await,
            Err(crate::engine::EngineError::ReservationExpired { .. })
        ));
        task.abort();
    }

    #[tokio::test]
    async fn compaction_waits_for_threshold() {
        let path = test_wal_path("compact_threshold.wal");
        let store = MemoryStore::open(&path).unwrap();
        for id in 1..=3 {
            crate::store::ShowtimeCatalog::insert_auditorium(
                &store,
                crate::seatmap::Auditorium::grid(id, 1, 1).unwrap(),
            )
            .await
            .unwrap();
        }

        assert!(!compact_if_needed(&store, 4).await.unwrap());
        assert!(compact_if_needed(&store, 3).await.unwrap());
        assert_eq!(store.appends_since_compact().await, 0);
        assert!(!compact_if_needed(&store, 3).await.unwrap());

        drop(store);
        let reopened = MemoryStore::open(&path).unwrap();
        assert_eq!(reopened.snapshot().len(), 3);
    }

    #[tokio::test]
    async fn ephemeral_store_never_compacts() {
        let store = MemoryStore::new();
        assert!(!compact_if_needed(&store, 1).await.unwrap());
    }
}
