//! Relay Client (module C3): WebSocket relay sessions, NIP-11 capability
//! fetch, and the NIP-77 reconciliation transport, built on top of
//! `nostr-relay-pool`'s connection/backoff/subscription management.

pub mod capability;
pub mod client;
pub mod convert;
pub mod error;
pub mod reconcile_transport;

pub use capability::CapabilityDocument;
pub use client::{RelayClient, Subscription, SubscriptionItem};
pub use error::{NetError, Result};
pub use reconcile_transport::{ReconcileFrame, ReconcileSession};
