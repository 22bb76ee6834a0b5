use std::io;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};

use crate::model::Event;
use crate::observability::{WAL_FLUSH_BATCH_SIZE, WAL_FLUSH_DURATION_SECONDS};

use super::wal::Wal;
use super::StoreError;

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Cloneable front of the writer task.
#[derive(Clone)]
pub(super) struct WalHandle {
    tx: mpsc::Sender<WalCommand>,
}

impl WalHandle {
    pub(super) fn spawn(wal: Wal) -> Self {
        let (tx, rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, rx));
        Self { tx }
    }

    /// Reserve queue space for one append. Dropping the slot sends nothing,
    /// so a caller cancelled while waiting here leaves no trace.
    pub(super) async fn reserve(&self) -> Result<AppendSlot<'_>, StoreError> {
        let permit = self.tx.reserve().await.map_err(|_| StoreError::WriterClosed)?;
        Ok(AppendSlot { permit })
    }

    pub(super) async fn compact(&self, events: Vec<Event>) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::WriterClosed)?;
        rx.await.map_err(|_| StoreError::WriterClosed)??;
        Ok(())
    }

    pub(super) async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// A reserved place in the writer queue.
pub(super) struct AppendSlot<'a> {
    permit: mpsc::Permit<'a, WalCommand>,
}

impl AppendSlot<'_> {
    /// Hand the event to the writer. Never blocks; the returned future
    /// resolves once the batch holding the event is fsynced.
    pub(super) fn send(self, event: Event) -> PendingAppend {
        let (tx, rx) = oneshot::channel();
        self.permit.send(WalCommand::Append { event, response: tx });
        PendingAppend { rx }
    }
}

pub(super) struct PendingAppend {
    rx: oneshot::Receiver<io::Result<()>>,
}

impl PendingAppend {
    pub(super) async fn durable(self) -> Result<(), StoreError> {
        self.rx.await.map_err(|_| StoreError::WriterClosed)??;
        Ok(())
    }
}

/// Owns the log and batches appends for group commit:
/// take the first append, drain whatever else is queued, fsync once, answer everyone.
/// Stops if a failed batch cannot be cut back out of the file; later commits
/// then get `WriterClosed`.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let healthy = match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            // Compaction must observe every append queued before it.
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                let mut healthy = commit_batch(&mut wal, &mut batch);
                if healthy && let Some(other) = deferred {
                    healthy = handle_non_append(&mut wal, other);
                }
                healthy
            }
            other => handle_non_append(&mut wal, other),
        };
        if !healthy {
            break;
        }
    }
    tracing::debug!("WAL writer for {} stopped", wal.path().display());
    wal.abandon();
}

/// Write and fsync one batch, then answer every waiter. A failed batch is
/// rolled back out of the file before anyone hears about it. Returns false
/// if the rollback failed and the log can no longer be trusted.
fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) -> bool {
    metrics::histogram!(WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(WAL_FLUSH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

    let mut healthy = true;
    if let Err(e) = &result {
        tracing::warn!("WAL flush of {} events failed: {e}", batch.len());
        if let Err(rollback) = wal.rollback() {
            tracing::error!(
                "cannot cut {} back to offset {}, closing WAL writer: {rollback}",
                wal.path().display(),
                wal.committed_len()
            );
            healthy = false;
        }
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
    healthy
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    for (event, _) in batch {
        wal.append_buffered(event)?;
    }
    wal.flush_sync()
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) -> bool {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|len| wal.swap_compact_file(len));
            let _ = response.send(result);
            true
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
            true
        }
        WalCommand::Append { event, response } => {
            let mut batch = vec![(event, response)];
            commit_batch(wal, &mut batch)
        }
    }
}
