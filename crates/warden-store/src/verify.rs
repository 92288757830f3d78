//! Cryptographic verification of inbound event JSON.
//!
//! Delegates id/signature checking to `nostr::Event`, the same check every
//! relay-pool session in the teacher performs before handing an `EVENT`
//! message to its own database layer. Everything past verification works
//! against our own [`StoredEvent`] shape (see `domain.rs`).

use nostr::Event;

use crate::domain::StoredEvent;
use crate::error::{Result, StoreError};

/// Parses `json` as a NIP-01 event, verifies its id and signature, and
/// returns the plain storage representation on success.
pub fn verify_and_parse(json: &str) -> Result<StoredEvent> {
    let event: Event =
        Event::from_json(json).map_err(|e| StoreError::Invalid(e.to_string()))?;
    event
        .verify()
        .map_err(|e| StoreError::Invalid(e.to_string()))?;

    serde_json::from_str(json).map_err(|e| StoreError::Invalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_json() {
        let err = verify_and_parse("not json").unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[test]
    fn rejects_tampered_signature() {
        let json = r#"{
            "id": "0000000000000000000000000000000000000000000000000000000000000000",
            "pubkey": "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
            "created_at": 1700000000,
            "kind": 1,
            "tags": [],
            "content": "hello",
            "sig": "00"
        }"#;
        let err = verify_and_parse(json).unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }
}
