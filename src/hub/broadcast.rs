use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use super::message::{Notification, Topic};

/// Serialized notification shared by every recipient of one publish
pub type Frame = Arc<str>;

pub type ViewerId = u64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub viewers: usize,
    pub subscriptions: usize,
}

enum HubCommand {
    Register {
        id: ViewerId,
        outbound: mpsc::Sender<Frame>,
    },
    Unregister {
        id: ViewerId,
    },
    Subscribe {
        id: ViewerId,
        topic: Topic,
    },
    Unsubscribe {
        id: ViewerId,
        topic: Topic,
    },
    Publish(Notification),
    Stats(oneshot::Sender<HubStats>),
}

struct Viewer {
    outbound: mpsc::Sender<Frame>,
    topics: HashSet<Topic>,
}

/// Cloneable handle used by the registry and viewer duties.
/// Every method returns immediately.
#[derive(Clone)]
pub struct HubHandle {
    sender: mpsc::UnboundedSender<HubCommand>,
    next_id: Arc<AtomicU64>,
}

impl HubHandle {
    /// Adds a viewer whose outbound queue is `outbound`. The hub owns the
    /// sending side from now on; the queue closes when the viewer leaves.
    pub fn register(&self, outbound: mpsc::Sender<Frame>) -> ViewerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.send(HubCommand::Register { id, outbound });
        id
    }

    pub fn unregister(&self, id: ViewerId) {
        self.send(HubCommand::Unregister { id });
    }

    pub fn subscribe(&self, id: ViewerId, topic: Topic) {
        self.send(HubCommand::Subscribe { id, topic });
    }

    pub fn unsubscribe(&self, id: ViewerId, topic: Topic) {
        self.send(HubCommand::Unsubscribe { id, topic });
    }

    pub fn publish(&self, notification: Notification) {
        self.send(HubCommand::Publish(notification));
    }

    /// Returns `None` once the hub has stopped
    pub async fn stats(&self) -> Option<HubStats> {
        let (tx, rx) = oneshot::channel();
        self.send(HubCommand::Stats(tx));
        rx.await.ok()
    }

    fn send(&self, command: HubCommand) {
        if self.sender.send(command).is_err() {
            tracing::debug!("Broadcast hub stopped, command dropped");
        }
    }
}

/// Single owner of the live viewer set. All mutation happens inside `run`,
/// which processes commands strictly in arrival order.
pub struct Hub {
    receiver: mpsc::UnboundedReceiver<HubCommand>,
    viewers: HashMap<ViewerId, Viewer>,
}

impl Hub {
    pub fn new() -> (Self, HubHandle) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let hub = Self {
            receiver,
            viewers: HashMap::new(),
        };
        let handle = HubHandle {
            sender,
            next_id: Arc::new(AtomicU64::new(1)),
        };
        (hub, handle)
    }

    /// Creates a hub and runs it on the current runtime
    pub fn spawn() -> HubHandle {
        let (hub, handle) = Self::new();
        tokio::spawn(hub.run());
        handle
    }

    /// Runs until every handle has been dropped
    pub async fn run(mut self) {
        tracing::info!("Broadcast hub started");

        while let Some(command) = self.receiver.recv().await {
            match command {
                HubCommand::Register { id, outbound } => {
                    self.viewers.insert(
                        id,
                        Viewer {
                            outbound,
                            topics: HashSet::new(),
                        },
                    );
                    tracing::debug!(viewer_id = id, viewers = self.viewers.len(), "Viewer registered");
                }
                HubCommand::Unregister { id } => {
                    if self.viewers.remove(&id).is_some() {
                        tracing::debug!(viewer_id = id, viewers = self.viewers.len(), "Viewer unregistered");
                    }
                }
                HubCommand::Subscribe { id, topic } => {
                    if let Some(viewer) = self.viewers.get_mut(&id) {
                        tracing::debug!(viewer_id = id, topic = %topic, "Viewer subscribed");
                        viewer.topics.insert(topic);
                    }
                }
                HubCommand::Unsubscribe { id, topic } => {
                    if let Some(viewer) = self.viewers.get_mut(&id) {
                        viewer.topics.remove(&topic);
                    }
                }
                HubCommand::Publish(notification) => self.publish(notification),
                HubCommand::Stats(reply) => {
                    let _ = reply.send(self.stats());
                }
            }
        }

        tracing::info!("Broadcast hub stopped");
    }

    fn publish(&mut self, notification: Notification) {
        let frame: Frame = match serde_json::to_string(&notification) {
            Ok(json) => json.into(),
            Err(e) => {
                tracing::error!(error = %e, target = %notification.target, "Failed to serialize notification");
                return;
            }
        };

        let mut evicted = Vec::new();
        for (id, viewer) in &self.viewers {
            if !viewer.topics.contains(&notification.target) {
                continue;
            }
            match viewer.outbound.try_send(frame.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(viewer_id = id, "Viewer queue full, evicting slow consumer");
                    evicted.push(*id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => evicted.push(*id),
            }
        }

        // Dropping the sender closes the queue, which tells the writer to stop.
        for id in evicted {
            self.viewers.remove(&id);
        }
    }

    fn stats(&self) -> HubStats {
        HubStats {
            viewers: self.viewers.len(),
            subscriptions: self.viewers.values().map(|v| v.topics.len()).sum(),
        }
    }
}
