//! One live connection and its reader/writer pumps.
//!
//! Exactly one task reads the transport (`read_pump`) and exactly one writes
//! it (`write_pump`). Either pump ending tears the whole client down through
//! `Client::destroy`, which is safe to call from anywhere, any number of
//! times.

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use axum::extract::ws::Message;
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};

use super::hub::{ClientId, Hub};
use super::registry::PlayerLiveness;
use crate::config::Config;
use crate::protocol::{self, Inbound, MessageType};

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Timing and size limits applied by the pumps.
#[derive(Clone, Copy, Debug)]
pub struct PumpLimits {
    pub write_wait: Duration,
    pub pong_wait: Duration,
    pub ping_period: Duration,
    pub max_message_size: usize,
}

impl From<&Config> for PumpLimits {
    fn from(cfg: &Config) -> Self {
        PumpLimits {
            write_wait: cfg.write_wait(),
            pong_wait: cfg.pong_wait(),
            ping_period: cfg.ping_period(),
            max_message_size: cfg.max_message_size,
        }
    }
}

#[derive(Debug)]
pub struct Client {
    id: ClientId,
    hub: Hub,
    player: Arc<PlayerLiveness>,
    terminated: AtomicBool,
    shutdown: watch::Sender<bool>,
}

/// Receiving end of a client's outbound queue. The matching sender lives
/// only inside the hub, so eviction closes the queue.
#[derive(Debug)]
pub struct Outbound {
    rx: mpsc::Receiver<Bytes>,
}

impl Outbound {
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

impl Client {
    /// Create a client for `player` and register it with `hub`.
    pub async fn connect(
        hub: Hub,
        player: Arc<PlayerLiveness>,
        queue_size: usize,
    ) -> (Arc<Client>, Outbound) {
        let (tx, rx) = mpsc::channel(queue_size);
        let (shutdown, _) = watch::channel(false);
        let client = Arc::new(Client {
            id: NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed),
            hub,
            player,
            terminated: AtomicBool::new(false),
            shutdown,
        });
        client.hub.register(client.id, tx).await;
        (client, Outbound { rx })
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn token(&self) -> &str {
        self.player.token()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Tear the client down: leave the hub, tell the rest of the game the
    /// player is gone, then close the transport. Only the first call acts.
    pub async fn destroy(&self) {
        if self
            .terminated
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        // Same mailbox, so the departing client is gone before the notice fans out.
        self.hub.unregister(self.id).await;
        tracing::info!(player = %self.token(), "sending lost player message");
        self.hub
            .broadcast_message(MessageType::LostPlayer, self.token().as_bytes())
            .await;
        self.shutdown.send_replace(true);
    }

    fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}

/// Pump inbound messages from the transport to the hub.
pub async fn read_pump<S, E>(client: Arc<Client>, mut stream: S, limits: PumpLimits)
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let mut shutdown = client.shutdown_signal();
    let mut deadline = Instant::now() + limits.pong_wait;
    loop {
        if client.is_terminated() {
            break;
        }
        let next = tokio::select! {
            _ = shutdown.changed() => break,
            next = time::timeout_at(deadline, stream.next()) => next,
        };
        let raw = match next {
            Err(_) => {
                tracing::info!(player = %client.token(), "no pong before read deadline");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                tracing::debug!(player = %client.token(), error = %e, "read failed");
                break;
            }
            Ok(Some(Ok(msg))) => match msg {
                Message::Pong(_) => {
                    deadline = Instant::now() + limits.pong_wait;
                    tracing::debug!(player = %client.token(), "pong received, resetting idle count");
                    client.player.reset_idle();
                    continue;
                }
                Message::Ping(_) => continue,
                Message::Close(_) => break,
                Message::Text(text) => text.into_bytes(),
                Message::Binary(bytes) => bytes,
            },
        };
        if raw.len() > limits.max_message_size {
            tracing::warn!(player = %client.token(), size = raw.len(), "inbound message too large");
            break;
        }
        match protocol::classify(raw) {
            Inbound::Relay(kind, frame) => {
                tracing::debug!(player = %client.token(), ?kind, "relaying message");
                client.hub.broadcast(frame).await;
            }
            Inbound::Violation(tag) => {
                tracing::warn!(player = %client.token(), ?tag, "unexpected incoming message type");
                break;
            }
        }
    }
    tracing::info!(player = %client.token(), "closing connection");
    client.destroy().await;
}

/// Pump queued frames from the hub to the transport, probing liveness.
pub async fn write_pump<K>(client: Arc<Client>, mut sink: K, mut outbound: Outbound, limits: PumpLimits)
where
    K: Sink<Message> + Unpin,
    K::Error: Display,
{
    let mut shutdown = client.shutdown_signal();
    let mut ping = time::interval_at(Instant::now() + limits.ping_period, limits.ping_period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        if client.is_terminated() {
            let _ = time::timeout(limits.write_wait, sink.send(Message::Close(None))).await;
            break;
        }
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = time::timeout(limits.write_wait, sink.send(Message::Close(None))).await;
                break;
            }
            next = outbound.rx.recv() => {
                let Some(first) = next else {
                    // The hub dropped us.
                    let _ = time::timeout(limits.write_wait, sink.send(Message::Close(None))).await;
                    break;
                };
                let queued = outbound.rx.len();
                let rest = std::iter::from_fn(|| outbound.rx.try_recv().ok()).take(queued);
                let frame = protocol::coalesce(first, rest);
                if let Err(reason) = write(&mut sink, to_message(frame), limits.write_wait).await {
                    tracing::debug!(player = %client.token(), %reason, "write failed");
                    break;
                }
            }
            _ = ping.tick() => {
                if let Err(reason) = write(&mut sink, Message::Ping(Vec::new()), limits.write_wait).await {
                    tracing::debug!(player = %client.token(), %reason, "ping failed");
                    break;
                }
            }
        }
    }
    client.destroy().await;
}

async fn write<K>(sink: &mut K, msg: Message, wait: Duration) -> anyhow::Result<()>
where
    K: Sink<Message> + Unpin,
    K::Error: Display,
{
    match time::timeout(wait, sink.send(msg)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(anyhow!("{}", e)),
        Err(_) => Err(anyhow!("write deadline exceeded")),
    }
}

fn to_message(frame: Bytes) -> Message {
    match String::from_utf8(frame.to_vec()) {
        Ok(text) => Message::Text(text),
        Err(e) => Message::Binary(e.into_bytes()),
    }
}
