//! Per-game fan-out actor.
//!
//! A `Hub` is a cheap handle onto a task that owns the set of registered
//! client queues for one game. Every change to that set and every broadcast
//! goes through a single FIFO mailbox, so events sent from one task are
//! applied in the order they were sent.

use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::protocol::{self, MessageType};

/// Capacity of each hub's event mailbox.
pub const HUB_MAILBOX_SIZE: usize = 256;

/// Identifies one client for the lifetime of the process.
pub type ClientId = u64;

enum HubEvent {
    Register(ClientId, mpsc::Sender<Bytes>),
    Unregister(ClientId),
    Broadcast(Bytes),
    Len(oneshot::Sender<usize>),
}

#[derive(Clone, Debug)]
pub struct Hub {
    tx: mpsc::Sender<HubEvent>,
}

impl Hub {
    /// Spawn the hub loop. It runs until every handle is dropped.
    pub fn spawn(game: &str) -> Self {
        let (tx, rx) = mpsc::channel(HUB_MAILBOX_SIZE);
        tokio::spawn(run(game.to_string(), rx));
        Hub { tx }
    }

    pub async fn register(&self, id: ClientId, queue: mpsc::Sender<Bytes>) {
        self.send(HubEvent::Register(id, queue)).await;
    }

    pub async fn unregister(&self, id: ClientId) {
        self.send(HubEvent::Unregister(id)).await;
    }

    /// Frame `payload` with `kind` and fan it out.
    pub async fn broadcast_message(&self, kind: MessageType, payload: &[u8]) {
        self.broadcast(protocol::frame(kind, payload)).await;
    }

    /// Fan out an already framed message.
    pub async fn broadcast(&self, frame: Bytes) {
        self.send(HubEvent::Broadcast(frame)).await;
    }

    /// Number of registered clients, as seen after every earlier event.
    pub async fn len(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        self.send(HubEvent::Len(tx)).await;
        rx.await.unwrap_or(0)
    }

    async fn send(&self, event: HubEvent) {
        if self.tx.send(event).await.is_err() {
            tracing::debug!("hub loop already stopped, event dropped");
        }
    }
}

async fn run(game: String, mut rx: mpsc::Receiver<HubEvent>) {
    let mut clients: HashMap<ClientId, mpsc::Sender<Bytes>> = HashMap::new();
    while let Some(event) = rx.recv().await {
        match event {
            HubEvent::Register(id, queue) => {
                clients.entry(id).or_insert(queue);
            }
            HubEvent::Unregister(id) => {
                // Dropping the sender closes the client's queue.
                clients.remove(&id);
            }
            HubEvent::Broadcast(frame) => {
                clients.retain(|id, queue| match queue.try_send(frame.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(%game, client = id, "client queue full, evicting");
                        false
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                });
            }
            HubEvent::Len(reply) => {
                let _ = reply.send(clients.len());
            }
        }
    }
    tracing::debug!(%game, "hub loop finished");
}
