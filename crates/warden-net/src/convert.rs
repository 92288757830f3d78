//! Conversion between `nostr::Event` (the wire/crypto type) and
//! `warden_store::StoredEvent` (the storage/indexing type). Goes via JSON
//! rather than walking `nostr`'s tag API directly, keeping this crate's
//! coupling to `nostr` limited to what it actually needs: parsing and
//! verification.

use warden_store::StoredEvent;

use crate::error::{NetError, Result};

pub fn to_stored(event: &nostr::Event) -> Result<StoredEvent> {
    serde_json::from_str(&event.as_json()).map_err(|e| NetError::Protocol(e.to_string()))
}

/// Builds the NIP-01 wire filter JSON directly rather than going through
/// `nostr::Filter`'s fluent builder, so tag filters (`#e`, `#p`, ...) land
/// on the wire exactly as named in [`warden_store::StoreFilter`] without
/// depending on that builder's tag-letter API.
pub fn to_nostr_filter(filter: &warden_store::StoreFilter) -> Result<nostr::Filter> {
    let mut obj = serde_json::Map::new();

    if !filter.ids.is_empty() {
        obj.insert("ids".into(), serde_json::json!(filter.ids));
    }
    if !filter.authors.is_empty() {
        obj.insert("authors".into(), serde_json::json!(filter.authors));
    }
    if !filter.kinds.is_empty() {
        obj.insert("kinds".into(), serde_json::json!(filter.kinds));
    }
    if let Some(since) = filter.since {
        obj.insert("since".into(), serde_json::json!(since.max(0)));
    }
    if let Some(until) = filter.until {
        obj.insert("until".into(), serde_json::json!(until.max(0)));
    }
    if let Some(limit) = filter.limit {
        obj.insert("limit".into(), serde_json::json!(limit));
    }
    if let Some(search) = &filter.search {
        obj.insert("search".into(), serde_json::json!(search));
    }
    for (name, values) in &filter.tags {
        if let Some(first_char) = name.chars().next() {
            obj.insert(format!("#{first_char}"), serde_json::json!(values));
        }
    }

    let json = serde_json::Value::Object(obj).to_string();
    nostr::Filter::from_json(json).map_err(|e| NetError::Protocol(e.to_string()))
}
