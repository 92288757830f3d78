//! Wire transport for the range-based set-reconciliation extension
//! (NIP-77), spec §4.3/§4.8/§6.1.
//!
//! This module only shuttles opaque message bytes between the local
//! `negentropy` engine and the relay; it has no opinion about reconciliation
//! semantics (query/save/replace/delete) — that lives in `warden-reconcile`.

use nostr_relay_pool::message::{ClientMessage, RelayMessage};
use nostr_relay_pool::{RelayPool, RelayPoolNotification};
use tokio::sync::mpsc;
use tracing::instrument;

use crate::error::{NetError, Result};

/// A frame received in reply to a reconciliation message.
#[derive(Debug, Clone)]
pub enum ReconcileFrame {
    /// `NEG-MSG`: an opaque negentropy protocol message to feed back into
    /// the local engine.
    Message(Vec<u8>),
    /// `NEG-ERR`: the peer rejected the exchange. Matched against the
    /// permissive "unsupported" substring list by the caller.
    Error(String),
}

/// An open reconciliation exchange with a single relay.
pub struct ReconcileSession {
    sub_id: nostr::SubscriptionId,
    relay_url: String,
    pool: RelayPool,
    frames: mpsc::Receiver<ReconcileFrame>,
}

impl ReconcileSession {
    #[instrument(skip(self))]
    pub async fn open(pool: &RelayPool, relay_url: &str, filter: nostr::Filter, initial_message: Vec<u8>) -> Result<Self> {
        let relay = pool.relay(relay_url).await.map_err(NetError::from)?;
        let sub_id = nostr::SubscriptionId::generate();

        relay
            .send_msg(ClientMessage::NegOpen {
                subscription_id: sub_id.clone(),
                filter: Box::new(filter),
                id_size: 32,
                initial_message: nostr::util::hex::encode(&initial_message),
            })
            .map_err(NetError::from)?;

        let (tx, rx) = mpsc::channel(64);
        let mut notifications = pool.notifications();
        let task_sub_id = sub_id.clone();
        let task_relay_url = relay_url.to_string();

        tokio::spawn(async move {
            while let Ok(notification) = notifications.recv().await {
                let RelayPoolNotification::Message { relay_url, message } = notification else {
                    if matches!(notification, RelayPoolNotification::Shutdown) {
                        break;
                    }
                    continue;
                };
                if relay_url.as_str() != task_relay_url {
                    continue;
                }
                let frame = match message {
                    RelayMessage::NegMsg { subscription_id, message } if subscription_id == task_sub_id => {
                        match nostr::util::hex::decode(&message) {
                            Ok(bytes) => ReconcileFrame::Message(bytes),
                            Err(e) => ReconcileFrame::Error(e.to_string()),
                        }
                    }
                    RelayMessage::NegErr { subscription_id, message } if subscription_id == task_sub_id => {
                        ReconcileFrame::Error(message)
                    }
                    _ => continue,
                };
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            sub_id,
            relay_url: relay_url.to_string(),
            pool: pool.clone(),
            frames: rx,
        })
    }

    pub async fn send(&self, message: Vec<u8>) -> Result<()> {
        let relay = self.pool.relay(&self.relay_url).await.map_err(NetError::from)?;
        relay
            .send_msg(ClientMessage::NegMsg {
                subscription_id: self.sub_id.clone(),
                message: nostr::util::hex::encode(&message),
            })
            .map_err(NetError::from)
    }

    pub async fn recv(&mut self) -> Option<ReconcileFrame> {
        self.frames.recv().await
    }

    pub async fn close(self) -> Result<()> {
        let relay = self.pool.relay(&self.relay_url).await.map_err(NetError::from)?;
        relay
            .send_msg(ClientMessage::NegClose {
                subscription_id: self.sub_id.clone(),
            })
            .map_err(NetError::from)
    }
}
