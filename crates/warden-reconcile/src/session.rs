//! Drives one reconciliation exchange to completion (spec §4.8): seeds a
//! negentropy range set from the local event store, shuttles messages
//! through `warden_net::ReconcileSession`, and pulls whatever the peer has
//! that the local store is missing.

use std::time::Duration;

use negentropy::{Id, Negentropy, NegentropyStorageVector};
use nostr_relay_pool::RelayPool;
use tracing::instrument;
use warden_net::{ReconcileFrame, ReconcileSession as WireSession};
use warden_store::{StoreFilter, StoredEvent};

use crate::adapter::StoreAdapter;
use crate::error::{classify_peer_message, ReconcileError, Result};

const FRAME_SIZE_LIMIT: u64 = 60_000;
/// Safety cap on protocol round-trips, independent of any relay timeout.
const MAX_ROUNDS: usize = 128;

/// Outcome of a completed pull: the events fetched from the peer to cover
/// what it had and the local store didn't. Every event here was genuinely
/// absent locally before this call (negentropy only offers `need` ids for
/// local gaps), so callers may safely run normal first-ingest side effects
/// (aggregate updates, cursor advancement) over them exactly once.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    pub pulled: Vec<StoredEvent>,
}

#[instrument(skip(pool, adapter, filter), fields(relay = %relay_url))]
pub async fn reconcile_pull(
    pool: &RelayPool,
    adapter: &StoreAdapter<'_>,
    relay_url: &str,
    filter: StoreFilter,
    round_timeout: Duration,
) -> Result<ReconcileOutcome> {
    let local_events = adapter.query(filter.clone()).await?;

    let mut storage = NegentropyStorageVector::new();
    for event in &local_events {
        let id = event_id(&event.id)?;
        storage
            .insert(event.created_at.max(0) as u64, id)
            .map_err(|e| ReconcileError::Protocol(e.to_string()))?;
    }
    storage.seal().map_err(|e| ReconcileError::Protocol(e.to_string()))?;

    let mut negentropy =
        Negentropy::new(storage, FRAME_SIZE_LIMIT).map_err(|e| ReconcileError::Protocol(e.to_string()))?;
    let initial_message = negentropy
        .initiate()
        .map_err(|e| ReconcileError::Protocol(e.to_string()))?;

    let nostr_filter = warden_net::convert::to_nostr_filter(&filter).map_err(ReconcileError::from)?;
    let mut wire = WireSession::open(pool, relay_url, nostr_filter, initial_message.to_vec())
        .await
        .map_err(ReconcileError::from)?;

    let mut need_ids: Vec<String> = Vec::new();
    let mut rounds = 0usize;

    loop {
        rounds += 1;
        if rounds > MAX_ROUNDS {
            return Err(ReconcileError::Protocol("exceeded maximum reconciliation rounds".into()));
        }

        let frame = tokio::time::timeout(round_timeout, wire.recv())
            .await
            .map_err(|_| ReconcileError::Transport("reconciliation round timed out".into()))?
            .ok_or_else(|| ReconcileError::Transport("relay closed reconciliation session".into()))?;

        let message = match frame {
            ReconcileFrame::Error(msg) => return Err(classify_peer_message(&msg)),
            ReconcileFrame::Message(bytes) => bytes,
        };

        let (next_message, _have, need) = negentropy
            .reconcile(&message)
            .map_err(|e| ReconcileError::Protocol(e.to_string()))?;

        need_ids.extend(need.iter().map(|id| hex::encode(id.as_bytes())));

        match next_message {
            Some(next) if !next.is_empty() => {
                wire.send(next.to_vec()).await.map_err(ReconcileError::from)?;
            }
            _ => break,
        }
    }

    let _ = wire.close().await;

    if need_ids.is_empty() {
        return Ok(ReconcileOutcome::default());
    }

    let relay = pool.relay(relay_url).await.map_err(warden_net::NetError::from)?;
    let pull_filter = StoreFilter::new().kinds(filter.kinds.iter().copied());
    let pull_filter = need_ids.iter().fold(pull_filter, |f, id| f.id(id.clone()));
    let nostr_pull_filter = warden_net::convert::to_nostr_filter(&pull_filter).map_err(ReconcileError::from)?;

    let events = relay
        .fetch_events(vec![nostr_pull_filter], round_timeout, Default::default())
        .await
        .map_err(|e| ReconcileError::Transport(e.to_string()))?;

    let mut pulled = Vec::new();
    for event in events {
        let stored = warden_net::convert::to_stored(&event).map_err(ReconcileError::from)?;
        adapter.replace(stored.clone()).await?;
        pulled.push(stored);
    }

    Ok(ReconcileOutcome { pulled })
}

fn event_id(hex_id: &str) -> Result<Id> {
    let bytes = hex::decode(hex_id).map_err(|e| ReconcileError::Protocol(e.to_string()))?;
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| ReconcileError::Protocol(format!("event id is not 32 bytes: {hex_id}")))?;
    Ok(Id::new(array))
}
