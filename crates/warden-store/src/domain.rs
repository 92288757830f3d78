use serde::{Deserialize, Serialize};

/// Wire/storage representation of a Nostr event (NIP-01 JSON shape).
///
/// Kept independent of `nostr::Event`'s in-memory representation: the only
/// thing this crate needs from the `nostr` crate is cryptographic
/// verification (`crate::verify::verify_and_parse`); everything downstream
/// (indexing, querying, replaceable supersede logic) only needs the plain
/// JSON-shaped fields, so we avoid coupling the store's schema to that
/// crate's internal tag/type representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: String,
    pub pubkey: String,
    pub created_at: i64,
    pub kind: u64,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: String,
}

impl StoredEvent {
    /// Replaceable per spec §3: kinds 0 (metadata), 3 (contacts), 10002 (relay list).
    pub fn is_replaceable(&self) -> bool {
        matches!(self.kind, 0 | 3 | 10002)
    }

    /// Parameterized-replaceable per spec §3: kind 30023 (long-form article).
    pub fn is_parameterized_replaceable(&self) -> bool {
        self.kind == 30023
    }

    /// Value of this event's `d` tag, if any.
    pub fn d_tag(&self) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.first().map(String::as_str) == Some("d"))
            .and_then(|t| t.get(1))
            .map(String::as_str)
    }

    /// All values of tags named `name` (second element of each matching row).
    pub fn tag_values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags
            .iter()
            .filter(move |t| t.first().map(String::as_str) == Some(name))
            .filter_map(|t| t.get(1).map(String::as_str))
    }

    /// `e`-tag event ids, in tag order (positional convention: oldest = root).
    pub fn e_tags(&self) -> Vec<&str> {
        self.tag_values("e").collect()
    }

    /// `bolt11` invoice string on a zap receipt, if present.
    pub fn bolt11(&self) -> Option<&str> {
        self.tag_values("bolt11").next()
    }
}
