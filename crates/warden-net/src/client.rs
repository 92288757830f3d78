//! Relay Client (spec §4.3, module C3).
//!
//! Wraps `nostr-relay-pool`'s session/backoff/subscription management: the
//! pool already maintains at most one live connection per relay URL,
//! reconnects with exponential backoff, and caps concurrent subscriptions
//! per session. This crate adapts that surface to the gateway's own event
//! and filter types and adds the out-of-band NIP-11 capability fetch.

use std::time::Duration;

use nostr_relay_pool::{RelayOptions, RelayPool, RelayPoolNotification, SubscribeOptions};
use tokio::sync::mpsc;
use tracing::instrument;
use warden_store::{StoreFilter, StoredEvent};

use crate::capability::{request_capability_document, CapabilityDocument};
use crate::convert::{to_nostr_filter, to_stored};
use crate::error::{NetError, Result};

/// An event delivered during [`RelayClient::subscribe`], or the
/// end-of-stored-events marker that lets callers transition from backfill
/// to live without tearing down the subscription.
#[derive(Debug, Clone)]
pub enum SubscriptionItem {
    Event(StoredEvent),
    Eose,
}

/// A live, cancellable subscription. Dropping or calling [`Self::cancel`]
/// closes the subscription; events already delivered on `items` are
/// retained by the receiver (spec §4.3: cancellation semantics).
pub struct Subscription {
    items: mpsc::Receiver<SubscriptionItem>,
    sub_id: nostr::SubscriptionId,
    relay_url: String,
    pool: RelayPool,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<SubscriptionItem> {
        self.items.recv().await
    }

    pub async fn cancel(self) {
        let _ = self.pool.relay(&self.relay_url).await.map(|relay| {
            let sub_id = self.sub_id.clone();
            async move {
                let _ = relay.unsubscribe(&sub_id).await;
            }
        });
    }
}

#[derive(Debug, Clone)]
pub struct RelayClient {
    pool: RelayPool,
    http: reqwest::Client,
}

impl Default for RelayClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayClient {
    pub fn new() -> Self {
        Self {
            pool: RelayPool::default(),
            http: reqwest::Client::new(),
        }
    }

    #[instrument(skip(self))]
    async fn ensure_connected(&self, relay_url: &str) -> Result<()> {
        self.pool
            .add_relay(relay_url, RelayOptions::default())
            .await
            .map_err(NetError::from)?;
        self.pool.connect_relay(relay_url).await.map_err(NetError::from)?;
        Ok(())
    }

    /// Opens a subscription, collects events until end-of-stored-events,
    /// closes it, and returns what was collected.
    #[instrument(skip(self, filter))]
    pub async fn fetch(&self, relay_url: &str, filter: StoreFilter, timeout: Duration) -> Result<Vec<StoredEvent>> {
        self.ensure_connected(relay_url).await?;
        let relay = self.pool.relay(relay_url).await.map_err(NetError::from)?;
        let nostr_filter = to_nostr_filter(&filter)?;

        let events = relay
            .fetch_events(vec![nostr_filter], timeout, Default::default())
            .await
            .map_err(NetError::from)?;

        events.into_iter().map(|e| to_stored(&e)).collect()
    }

    /// Opens a long-lived subscription. The returned handle yields events
    /// as they arrive and a distinguished [`SubscriptionItem::Eose`] marker,
    /// then keeps streaming until [`Subscription::cancel`] is called.
    #[instrument(skip(self, filter))]
    pub async fn subscribe(&self, relay_url: &str, filter: StoreFilter) -> Result<Subscription> {
        self.ensure_connected(relay_url).await?;
        let relay = self.pool.relay(relay_url).await.map_err(NetError::from)?;
        let nostr_filter = to_nostr_filter(&filter)?;

        let output = relay
            .subscribe(vec![nostr_filter], SubscribeOptions::default())
            .await
            .map_err(NetError::from)?;
        let sub_id = output.val;

        let (tx, rx) = mpsc::channel(256);
        let mut notifications = self.pool.notifications();
        let task_sub_id = sub_id.clone();
        let task_relay_url = relay_url.to_string();

        tokio::spawn(async move {
            while let Ok(notification) = notifications.recv().await {
                match notification {
                    RelayPoolNotification::Event {
                        relay_url,
                        subscription_id,
                        event,
                    } if relay_url.as_str() == task_relay_url && subscription_id == task_sub_id => {
                        let Ok(stored) = to_stored(&event) else { continue };
                        if tx.send(SubscriptionItem::Event(stored)).await.is_err() {
                            break;
                        }
                    }
                    RelayPoolNotification::Message {
                        relay_url,
                        message: nostr_relay_pool::message::RelayMessage::EndOfStoredEvents(sub_id),
                    } if relay_url.as_str() == task_relay_url && sub_id == task_sub_id => {
                        if tx.send(SubscriptionItem::Eose).await.is_err() {
                            break;
                        }
                    }
                    RelayPoolNotification::Shutdown => break,
                    _ => {}
                }
            }
        });

        Ok(Subscription {
            items: rx,
            sub_id,
            relay_url: relay_url.to_string(),
            pool: self.pool.clone(),
        })
    }

    #[instrument(skip(self))]
    pub async fn request_capability_document(&self, relay_url: &str) -> Result<CapabilityDocument> {
        request_capability_document(&self.http, relay_url).await
    }

    /// Ensures a session exists before handing the underlying pool to the
    /// reconciliation transport, which needs direct `RelayPool` access.
    #[instrument(skip(self))]
    pub async fn reconciliation_pool(&self, relay_url: &str) -> Result<RelayPool> {
        self.ensure_connected(relay_url).await?;
        Ok(self.pool.clone())
    }
}
