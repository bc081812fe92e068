use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use super::store::{RegistrySnapshot, SessionStore};

/// Outcome of a durable save, delivered to whoever waited on it
pub type SaveAck = oneshot::Receiver<Result<(), String>>;

struct SaveRequest {
    snapshot: RegistrySnapshot,
    ack: Option<oneshot::Sender<Result<(), String>>>,
}

/// Non-blocking, ordered writer in front of a `SessionStore`
///
/// Snapshots are written in the order they were enqueued, so a later commit
/// is never overwritten by an earlier one. When several snapshots are
/// waiting, only the newest is written and every waiter gets its result.
#[derive(Clone)]
pub struct PersistQueue {
    sender: mpsc::UnboundedSender<SaveRequest>,
}

impl PersistQueue {
    /// Creates the queue and spawns its background writer
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(Self::process_saves(store, receiver));
        Self { sender }
    }

    /// Queues a snapshot and returns immediately
    pub fn enqueue(&self, snapshot: RegistrySnapshot) {
        if self.sender.send(SaveRequest { snapshot, ack: None }).is_err() {
            tracing::error!("Persistence writer stopped, snapshot dropped");
        }
    }

    /// Queues a snapshot; the returned receiver resolves once it is on disk
    pub fn enqueue_durable(&self, snapshot: RegistrySnapshot) -> SaveAck {
        let (ack, rx) = oneshot::channel();
        if let Err(mpsc::error::SendError(request)) = self.sender.send(SaveRequest {
            snapshot,
            ack: Some(ack),
        }) {
            if let Some(ack) = request.ack {
                let _ = ack.send(Err("persistence writer stopped".to_string()));
            }
        }
        rx
    }

    async fn process_saves(
        store: Arc<dyn SessionStore>,
        mut receiver: mpsc::UnboundedReceiver<SaveRequest>,
    ) {
        tracing::debug!("Persistence writer started");

        while let Some(first) = receiver.recv().await {
            let mut snapshot = first.snapshot;
            let mut acks: Vec<_> = first.ack.into_iter().collect();

            while let Ok(next) = receiver.try_recv() {
                snapshot = next.snapshot;
                acks.extend(next.ack);
            }

            let writer = store.clone();
            let result = match tokio::task::spawn_blocking(move || writer.save(&snapshot)).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(e) => Err(format!("save task failed: {}", e)),
            };

            if let Err(ref e) = result {
                tracing::error!(error = %e, "Failed to persist session registry");
            }

            for ack in acks {
                let _ = ack.send(result.clone());
            }
        }

        tracing::debug!("Persistence writer stopped");
    }
}
