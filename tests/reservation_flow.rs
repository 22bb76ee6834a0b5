use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ulid::Ulid;

use boxoffice::cache::MemoryCache;
use boxoffice::clock::ManualClock;
use boxoffice::engine::{Engine, EngineError, ErrorKind};
use boxoffice::model::{HOLD_DURATION_MS, Movie, Seat, Showtime};
use boxoffice::movies::StaticMovieDirectory;
use boxoffice::reaper;
use boxoffice::store::MemoryStore;

const MINUTE: i64 = 60_000;
const T0: i64 = 1_750_000_000_000;

// ── Test infrastructure ──────────────────────────────────────

fn data_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("boxoffice_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn movies() -> StaticMovieDirectory {
    StaticMovieDirectory::new([
        Movie {
            id: "tt0110912".into(),
            title: "Pulp Fiction".into(),
            year: Some(1994),
            stars: Some("John Travolta, Uma Thurman".into()),
        },
        Movie {
            id: "tt0068646".into(),
            title: "The Godfather".into(),
            year: Some(1972),
            stars: None,
        },
    ])
}

fn engine_on(store: Arc<MemoryStore>, clock: Arc<ManualClock>) -> Arc<Engine> {
    Arc::new(Engine::new(store, clock).with_movies(
        Arc::new(movies()),
        Arc::new(MemoryCache::new()),
        Duration::from_secs(3600),
    ))
}

async fn cinema(engine: &Engine) -> Showtime {
    engine.provision_auditorium(1, 28, 22).await.unwrap();
    engine.provision_auditorium(2, 21, 18).await.unwrap();
    engine
        .schedule_showtime("Pulp Fiction", 1, T0 + 120 * MINUTE)
        .await
        .unwrap()
}

fn row(r: u16, numbers: std::ops::RangeInclusive<u16>) -> Vec<Seat> {
    numbers.map(|n| Seat::new(r, n)).collect()
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn book_pay_and_lapse() {
    let clock = Arc::new(ManualClock::new(T0));
    let engine = engine_on(Arc::new(MemoryStore::new()), clock.clone());
    let show = cinema(&engine).await;
    assert_eq!(engine.available_seats(show.id).await.unwrap().len(), 28 * 22);

    let paying = engine.reserve(show.id, &row(10, 5..=8)).await.unwrap();
    let browsing = engine.reserve(show.id, &row(10, 9..=10)).await.unwrap();
    assert_eq!(engine.available_seats(show.id).await.unwrap().len(), 28 * 22 - 6);

    clock.advance(4 * MINUTE);
    engine.confirm(paying.id).await.unwrap();

    clock.advance(HOLD_DURATION_MS);
    let free = engine.available_seats(show.id).await.unwrap();
    assert_eq!(free.len(), 28 * 22 - 4);
    assert!(free.contains(&Seat::new(10, 9)));
    assert!(!free.contains(&Seat::new(10, 5)));

    let err = engine.confirm(browsing.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(!err.is_retryable());
    assert!(matches!(err, EngineError::ReservationExpired { .. }));
}

#[tokio::test]
async fn showtimes_do_not_share_seats() {
    let clock = Arc::new(ManualClock::new(T0));
    let engine = engine_on(Arc::new(MemoryStore::new()), clock);
    let early = cinema(&engine).await;
    let late = engine
        .schedule_showtime("tt0068646", 2, T0 + 300 * MINUTE)
        .await
        .unwrap();
    assert_eq!(late.movie.title, "The Godfather");

    engine.reserve(early.id, &row(1, 1..=2)).await.unwrap();
    engine.reserve(late.id, &row(1, 1..=2)).await.unwrap();
    assert_eq!(engine.available_seats(late.id).await.unwrap().len(), 21 * 18 - 2);
}

#[tokio::test]
async fn errors_carry_kinds() {
    let clock = Arc::new(ManualClock::new(T0));
    let engine = engine_on(Arc::new(MemoryStore::new()), clock);
    let show = cinema(&engine).await;

    let not_found = engine.reserve(Ulid::new(), &row(1, 1..=1)).await.unwrap_err();
    assert_eq!(not_found.kind(), ErrorKind::NotFound);

    let invalid = engine
        .reserve(show.id, &[Seat::new(1, 1), Seat::new(2, 2)])
        .await
        .unwrap_err();
    assert_eq!(invalid.kind(), ErrorKind::InvalidRequest);

    engine.reserve(show.id, &row(1, 1..=1)).await.unwrap();
    let conflict = engine.reserve(show.id, &row(1, 1..=1)).await.unwrap_err();
    assert_eq!(conflict.kind(), ErrorKind::Conflict);
    assert!(!conflict.is_retryable());
    assert_eq!(conflict.to_string(), format!("seats unavailable for showtime {}: (1,1)", show.id));
}

#[tokio::test]
async fn restart_keeps_sales_and_drops_lapsed_holds() {
    let dir = data_dir();
    let wal = dir.join("boxoffice.wal");
    let clock = Arc::new(ManualClock::new(T0));

    let (show, sold, lapsed) = {
        let store = Arc::new(MemoryStore::open(&wal).unwrap());
        let engine = engine_on(store.clone(), clock.clone());
        let show = cinema(&engine).await;
        let sold = engine.reserve(show.id, &row(5, 1..=3)).await.unwrap();
        engine.confirm(sold.id).await.unwrap();
        let lapsed = engine.reserve(show.id, &row(6, 1..=2)).await.unwrap();

        clock.advance(11 * MINUTE);
        assert_eq!(engine.sweep_all().await.unwrap(), 1);
        assert!(reaper::compact_if_needed(&store, 1).await.unwrap());
        (show, sold, lapsed)
    };

    let store = Arc::new(MemoryStore::open(&wal).unwrap());
    let engine = engine_on(store, clock);
    assert_eq!(engine.get_showtime(show.id).await.unwrap(), show);
    assert!(engine.get_reservation(sold.id).await.unwrap().paid);
    // Reclaimed holds are gone from the log; the expiry tombstone does not survive a restart.
    assert_eq!(
        engine.get_reservation(lapsed.id).await,
        Err(EngineError::ReservationNotFound(lapsed.id))
    );
    let free = engine.available_seats(show.id).await.unwrap();
    assert_eq!(free.len(), 28 * 22 - 3);
    assert!(free.contains(&Seat::new(6, 1)));

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_buyers_one_row() {
    let clock = Arc::new(ManualClock::new(T0));
    let engine = engine_on(Arc::new(MemoryStore::new()), clock);
    let show = cinema(&engine).await;
    let show_id = show.id;

    let mut handles = Vec::new();
    for first in 1..=20u16 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let seats = row(7, first..=first + 2);
            match engine.reserve(show_id, &seats).await {
                Ok(ticket) => engine.confirm(ticket.id).await.map(|t| t.seats.len()),
                Err(e) => Err(e),
            }
        }));
    }

    let mut sold = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(n) => sold += n,
            Err(e) => assert!(matches!(e, EngineError::SeatsUnavailable { .. }), "{e}"),
        }
    }
    let taken = 22 - engine
        .available_seats(show_id)
        .await
        .unwrap()
        .iter()
        .filter(|s| s.row == 7)
        .count();
    assert_eq!(taken, sold);
    assert!(sold >= 3);
}
