//! Filter Builder (spec §4.6, module C6).
//!
//! Allow/denylist are deliberately NOT applied here: relays do not honor
//! exclusion semantics, so scope restriction happens post-query on ingest
//! instead (see `warden-sync`).

use warden_store::StoreFilter;

const KIND_METADATA: u64 = 0;
const KIND_NOTE: u64 = 1;
const KIND_CONTACTS: u64 = 3;
const KIND_REPOST: u64 = 6;
const KIND_REACTION: u64 = 7;
const KIND_ZAP_RECEIPT: u64 = 9735;
const KIND_RELAY_LIST: u64 = 10002;
const KIND_ARTICLE: u64 = 30023;

/// Mention/inbox filter kinds are fixed regardless of `sync.kinds` (spec §4.6).
pub const INBOX_KINDS: [u64; 4] = [KIND_NOTE, KIND_REPOST, KIND_REACTION, KIND_ZAP_RECEIPT];
/// Replaceable kinds refreshed on a timer regardless of cursor (spec §4.6/§4.7).
pub const REPLACEABLE_KINDS: [u64; 4] = [KIND_METADATA, KIND_CONTACTS, KIND_RELAY_LIST, KIND_ARTICLE];

/// Splits `authors` into batches no larger than `batch_size`, respecting
/// relay message-size limits.
pub fn batch_authors(authors: &[String], batch_size: usize) -> Vec<Vec<String>> {
    if batch_size == 0 {
        return vec![authors.to_vec()];
    }
    authors.chunks(batch_size).map(|chunk| chunk.to_vec()).collect()
}

/// `{authors: batch, kinds: configured, since: cursor}`.
pub fn outbox_filter(batch: &[String], kinds: &[u64], since: i64) -> StoreFilter {
    StoreFilter::new()
        .authors(batch.iter().cloned())
        .kinds(kinds.iter().copied())
        .since(since)
}

/// `{kinds: {1,6,7,9735}, tags: {p: [owner]}, since: cursor}`.
pub fn mention_filter(owner: &str, since: i64) -> StoreFilter {
    StoreFilter::new()
        .kinds(INBOX_KINDS)
        .tag("p", [owner.to_string()])
        .since(since)
}

/// `{authors: batch, kinds: {0,3,10002,30023}}`, no `since` — always refreshed.
pub fn replaceable_refresh_filter(batch: &[String]) -> StoreFilter {
    StoreFilter::new().authors(batch.iter().cloned()).kinds(REPLACEABLE_KINDS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_respect_size() {
        let authors: Vec<String> = (0..250).map(|i| format!("author-{i}")).collect();
        let batches = batch_authors(&authors, 100);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 100);
        assert_eq!(batches[2].len(), 50);
    }

    #[test]
    fn mention_filter_targets_owner_p_tag() {
        let filter = mention_filter("owner-pk", 1000);
        assert_eq!(filter.tags, vec![("p".to_string(), vec!["owner-pk".to_string()])]);
        assert_eq!(filter.since, Some(1000));
        assert_eq!(filter.kinds, INBOX_KINDS.to_vec());
    }

    #[test]
    fn replaceable_refresh_has_no_since() {
        let filter = replaceable_refresh_filter(&["a".to_string()]);
        assert_eq!(filter.since, None);
        assert_eq!(filter.kinds, REPLACEABLE_KINDS.to_vec());
    }
}
