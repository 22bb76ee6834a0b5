use std::net::SocketAddr;

use crate::engine::EngineError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: reservation attempts. Labels: outcome.
pub const RESERVATIONS_TOTAL: &str = "boxoffice_reservations_total";

/// Counter: confirmation attempts. Labels: outcome.
pub const CONFIRMATIONS_TOTAL: &str = "boxoffice_confirmations_total";

/// Histogram: availability computation latency in seconds.
pub const AVAILABILITY_DURATION_SECONDS: &str = "boxoffice_availability_duration_seconds";

/// Histogram: seats per successful reservation.
pub const RESERVED_SEATS: &str = "boxoffice_reserved_seats";

// ── USE metrics (resource utilization) ──────────────────────────

/// Counter: expired holds reclaimed, inline or by the sweeper.
pub const HOLDS_RECLAIMED_TOTAL: &str = "boxoffice_holds_reclaimed_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "boxoffice_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "boxoffice_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short label for the outcome of an engine call.
pub fn outcome_label<T>(result: &Result<T, EngineError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => match e {
            EngineError::ShowtimeNotFound(_) => "showtime_not_found",
            EngineError::ReservationNotFound(_) => "reservation_not_found",
            EngineError::AuditoriumNotFound(_) => "auditorium_not_found",
            EngineError::MovieNotFound(_) => "movie_not_found",
            EngineError::NoSeatsRequested => "no_seats",
            EngineError::DuplicateSeat(_) => "duplicate_seat",
            EngineError::SeatsNotContiguous(_) => "not_contiguous",
            EngineError::SeatsOutsideAuditorium { .. } => "outside_auditorium",
            EngineError::ShowtimeInPast { .. } => "showtime_in_past",
            EngineError::InvalidLayout(_) => "invalid_layout",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::SeatsUnavailable { .. } => "seats_unavailable",
            EngineError::AlreadyConfirmed(_) => "already_confirmed",
            EngineError::ReservationExpired { .. } => "expired",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::Storage(_) => "storage_error",
        },
    }
}
