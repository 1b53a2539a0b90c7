use std::{str::FromStr, sync::Arc};

use parking_lot::Mutex;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::{
    domain::{Reason, Stats},
    infrastructure::shutdown::ShutdownListener,
    store::{StatsStore, StoreError},
};

/// How `record` reaches the persisted counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatsWriteMode {
    /// One writer task owns the document; records are queued and applied in
    /// order, so no increment is lost.
    #[default]
    Serialized,
    /// Every record reads, bumps and writes the document on its own task.
    /// Concurrent records can read the same baseline and overwrite each
    /// other (lost updates).
    ReadModifyWrite,
}

impl FromStr for StatsWriteMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "serialized" | "queue" => Ok(StatsWriteMode::Serialized),
            "read-modify-write" | "rmw" => Ok(StatsWriteMode::ReadModifyWrite),
            other => Err(format!("unknown stats write mode: {other}")),
        }
    }
}

enum StatsCommand {
    Record(Reason),
    Reset(oneshot::Sender<Result<Stats, StoreError>>),
    Flush(oneshot::Sender<()>),
}

/// Shared entry point for outcome counters. Cheap to clone; every scan
/// instance holds one.
#[derive(Clone)]
pub struct StatsAggregator {
    store: StatsStore,
    mode: StatsWriteMode,
    sender: mpsc::UnboundedSender<StatsCommand>,
    in_flight: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl StatsAggregator {
    pub fn start(
        store: StatsStore,
        mode: StatsWriteMode,
        shutdown: ShutdownListener,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let writer = StatsWriter {
            store: store.clone(),
            receiver,
        };
        let handle = tokio::spawn(writer.run(shutdown));
        tracing::info!(target: "stats", ?mode, "stats aggregator started");
        (
            Self {
                store,
                mode,
                sender,
                in_flight: Arc::new(Mutex::new(Vec::new())),
            },
            handle,
        )
    }

    /// Counts one outcome. Returns immediately; persistence happens in the
    /// background.
    pub fn record(&self, reason: Reason) {
        match self.mode {
            StatsWriteMode::Serialized => {
                if self.sender.send(StatsCommand::Record(reason)).is_err() {
                    tracing::debug!(target: "stats", reason = reason.label(), "stats writer stopped; outcome dropped");
                }
            }
            StatsWriteMode::ReadModifyWrite => {
                let store = self.store.clone();
                let handle = tokio::spawn(async move {
                    let result = async {
                        let mut stats = store.read().await?;
                        stats.apply(reason);
                        store.write(&stats).await
                    }
                    .await;
                    if let Err(err) = result {
                        tracing::warn!(target: "stats", error = %err, "failed to record outcome");
                    }
                });
                let mut in_flight = self.in_flight.lock();
                in_flight.retain(|task| !task.is_finished());
                in_flight.push(handle);
            }
        }
    }

    /// Waits until every outcome recorded so far has been written.
    pub async fn flush(&self) {
        match self.mode {
            StatsWriteMode::Serialized => {
                let (tx, rx) = oneshot::channel();
                if self.sender.send(StatsCommand::Flush(tx)).is_ok() {
                    let _ = rx.await;
                }
            }
            StatsWriteMode::ReadModifyWrite => {
                let pending: Vec<JoinHandle<()>> = self.in_flight.lock().drain(..).collect();
                for task in pending {
                    let _ = task.await;
                }
            }
        }
    }

    pub async fn read(&self) -> Result<Stats, StoreError> {
        self.store.read().await
    }

    pub async fn reset(&self) -> Result<Stats, StoreError> {
        match self.mode {
            StatsWriteMode::Serialized => {
                let (tx, rx) = oneshot::channel();
                if self.sender.send(StatsCommand::Reset(tx)).is_err() {
                    return self.store.reset().await;
                }
                rx.await.unwrap_or_else(|_| {
                    Err(StoreError::Unavailable("stats writer stopped".into()))
                })
            }
            StatsWriteMode::ReadModifyWrite => {
                self.flush().await;
                self.store.reset().await
            }
        }
    }
}

struct StatsWriter {
    store: StatsStore,
    receiver: mpsc::UnboundedReceiver<StatsCommand>,
}

impl StatsWriter {
    async fn run(mut self, mut shutdown: ShutdownListener) {
        loop {
            tokio::select! {
                biased;
                command = self.receiver.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                _ = shutdown.notified() => break,
            }
        }
        while let Ok(command) = self.receiver.try_recv() {
            self.handle(command).await;
        }
        tracing::info!(target: "stats", "stats writer stopped");
    }

    /// Handles `first` plus everything already queued behind it, folding
    /// consecutive records into a single read-modify-write.
    async fn handle(&mut self, first: StatsCommand) {
        let mut pending = Vec::new();
        let mut flushes = Vec::new();
        let mut next = Some(first);
        while let Some(command) = next.take() {
            match command {
                StatsCommand::Record(reason) => pending.push(reason),
                StatsCommand::Flush(tx) => flushes.push(tx),
                StatsCommand::Reset(tx) => {
                    self.commit(&mut pending).await;
                    let _ = tx.send(self.store.reset().await);
                    tracing::info!(target: "stats", "stats reset");
                }
            }
            next = self.receiver.try_recv().ok();
        }
        self.commit(&mut pending).await;
        for tx in flushes {
            let _ = tx.send(());
        }
    }

    async fn commit(&self, pending: &mut Vec<Reason>) {
        if pending.is_empty() {
            return;
        }
        let count = pending.len();
        let result = async {
            let mut stats = self.store.read().await?;
            for reason in pending.drain(..) {
                stats.apply(reason);
            }
            self.store.write(&stats).await
        }
        .await;
        match result {
            Ok(()) => tracing::debug!(target: "stats", count, "outcomes committed"),
            Err(err) => {
                pending.clear();
                tracing::warn!(target: "stats", error = %err, count, "failed to commit outcomes");
            }
        }
    }
}
