//! Graph Builder (spec §4.5, module C5).
//!
//! Expands the in-scope author set breadth-first from the owner's contact
//! list, bounded by `max-authors`, with allow/deny overrides applied after
//! expansion (denylist dominates allowlist).

use std::collections::{HashSet, VecDeque};

use serde::Deserialize;
use tracing::instrument;
use warden_store::{EventStore, GraphNode, StoreFilter};

const KIND_CONTACTS: u64 = 3;

/// Graph expansion rule (spec §6.4: `sync.scope.mode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeMode {
    #[serde(rename = "self")]
    SelfOnly,
    Following,
    Mutual,
    Foaf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphConfig {
    pub mode: ScopeMode,
    pub depth: u32,
    pub max_authors: usize,
    #[serde(default)]
    pub allowlist: Vec<String>,
    #[serde(default)]
    pub denylist: Vec<String>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            mode: ScopeMode::Following,
            depth: 1,
            max_authors: 2000,
            allowlist: Vec::new(),
            denylist: Vec::new(),
        }
    }
}

/// Result of one graph build: the final author set, whether the owner's
/// own contact list was empty, and whether the cap cut expansion short.
#[derive(Debug, Clone)]
pub struct GraphResult {
    pub authors: Vec<(String, u32, bool)>,
    pub incomplete: bool,
}

pub struct GraphBuilder<'a> {
    store: &'a EventStore,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(store: &'a EventStore) -> Self {
        Self { store }
    }

    /// Returns the latest contact-list pubkeys for `pubkey`, or `None` if no
    /// kind-3 has been ingested for them yet.
    async fn contacts(&self, pubkey: &str) -> Option<Vec<String>> {
        let events = self
            .store
            .query(StoreFilter::new().author(pubkey).kind(KIND_CONTACTS).limit(1))
            .await
            .ok()?;
        let event = events.into_iter().next()?;
        Some(event.tag_values("p").map(str::to_string).collect())
    }

    #[instrument(skip(self, config))]
    pub async fn build(&self, owner: &str, config: &GraphConfig) -> GraphResult {
        let deny: HashSet<&str> = config.denylist.iter().map(String::as_str).collect();
        let mut nodes: Vec<(String, u32, bool)> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut incomplete = false;

        let push = |pubkey: String, depth: u32, mutual: bool, nodes: &mut Vec<(String, u32, bool)>, seen: &mut HashSet<String>| -> bool {
            if deny.contains(pubkey.as_str()) || seen.contains(&pubkey) {
                return false;
            }
            if nodes.len() >= config.max_authors && !config.allowlist.iter().any(|a| a == &pubkey) {
                return false;
            }
            seen.insert(pubkey.clone());
            nodes.push((pubkey, depth, mutual));
            true
        };

        push(owner.to_string(), 0, false, &mut nodes, &mut seen);

        match config.mode {
            ScopeMode::SelfOnly => {}
            ScopeMode::Following => {
                let contacts = self.contacts(owner).await.unwrap_or_default();
                for pubkey in contacts {
                    if nodes.len() >= config.max_authors && !config.allowlist.iter().any(|a| a == &pubkey) {
                        incomplete = true;
                        continue;
                    }
                    push(pubkey, 1, false, &mut nodes, &mut seen);
                }
            }
            ScopeMode::Mutual => {
                let contacts = self.contacts(owner).await.unwrap_or_default();
                for pubkey in contacts {
                    let their_contacts = self.contacts(&pubkey).await;
                    let mutual = match &their_contacts {
                        Some(theirs) => theirs.iter().any(|p| p == owner),
                        // Unknown kind-3: tentatively include, re-evaluated once it arrives.
                        None => true,
                    };
                    if their_contacts.is_some() && !mutual {
                        continue;
                    }
                    let confirmed_mutual = their_contacts.is_some() && mutual;
                    if nodes.len() >= config.max_authors && !config.allowlist.iter().any(|a| a == &pubkey) {
                        incomplete = true;
                        continue;
                    }
                    push(pubkey, 1, confirmed_mutual, &mut nodes, &mut seen);
                }
            }
            ScopeMode::Foaf => {
                let mut queue: VecDeque<(String, u32)> = VecDeque::new();
                queue.push_back((owner.to_string(), 0));
                while let Some((pubkey, depth)) = queue.pop_front() {
                    if depth >= config.depth {
                        continue;
                    }
                    let contacts = self.contacts(&pubkey).await.unwrap_or_default();
                    for next in contacts {
                        if nodes.len() >= config.max_authors && !config.allowlist.iter().any(|a| a == &next) {
                            incomplete = true;
                            continue;
                        }
                        if push(next.clone(), depth + 1, false, &mut nodes, &mut seen) {
                            queue.push_back((next, depth + 1));
                        }
                    }
                }
            }
        }

        for allowed in &config.allowlist {
            if deny.contains(allowed.as_str()) {
                continue;
            }
            if !seen.contains(allowed) {
                seen.insert(allowed.clone());
                nodes.push((allowed.clone(), u32::MAX, false));
            }
        }

        GraphResult { authors: nodes, incomplete }
    }
}

/// Converts a build result into the [`GraphNode`] rows to persist.
pub fn to_graph_nodes(result: &GraphResult, now: i64) -> Vec<GraphNode> {
    result
        .authors
        .iter()
        .map(|(pubkey, depth, mutual)| GraphNode {
            pubkey: pubkey.clone(),
            depth: *depth,
            mutual: *mutual,
            last_seen: now,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_store::{PutOutcome, StoredEvent};

    fn contact_list(pubkey: &str, contacts: &[&str], created_at: i64) -> StoredEvent {
        StoredEvent {
            id: format!("{:0>64}", format!("{pubkey}-{created_at}")),
            pubkey: pubkey.to_string(),
            created_at,
            kind: KIND_CONTACTS,
            tags: contacts.iter().map(|c| vec!["p".to_string(), c.to_string()]).collect(),
            content: String::new(),
            sig: "sig".to_string(),
        }
    }

    #[tokio::test]
    async fn self_mode_is_just_owner() {
        let (store, _) = warden_store::open_in_memory().await.unwrap();
        let builder = GraphBuilder::new(&store);
        let config = GraphConfig {
            mode: ScopeMode::SelfOnly,
            ..GraphConfig::default()
        };
        let result = builder.build("owner", &config).await;
        assert_eq!(result.authors, vec![("owner".to_string(), 0, false)]);
    }

    #[tokio::test]
    async fn following_includes_contacts() {
        let (store, _) = warden_store::open_in_memory().await.unwrap();
        assert_eq!(
            store.put_event(contact_list("owner", &["a", "b"], 100)).await.unwrap(),
            PutOutcome::Stored
        );

        let builder = GraphBuilder::new(&store);
        let config = GraphConfig {
            mode: ScopeMode::Following,
            ..GraphConfig::default()
        };
        let result = builder.build("owner", &config).await;
        let pubkeys: HashSet<_> = result.authors.iter().map(|(p, _, _)| p.as_str()).collect();
        assert_eq!(pubkeys, HashSet::from(["owner", "a", "b"]));
    }

    #[tokio::test]
    async fn mutual_excludes_one_directional_contact() {
        let (store, _) = warden_store::open_in_memory().await.unwrap();
        store.put_event(contact_list("owner", &["a"], 100)).await.unwrap();
        // `a` does not list owner back.
        store.put_event(contact_list("a", &["z"], 100)).await.unwrap();

        let builder = GraphBuilder::new(&store);
        let config = GraphConfig {
            mode: ScopeMode::Mutual,
            ..GraphConfig::default()
        };
        let result = builder.build("owner", &config).await;
        let pubkeys: HashSet<_> = result.authors.iter().map(|(p, _, _)| p.as_str()).collect();
        assert_eq!(pubkeys, HashSet::from(["owner"]));
    }

    #[tokio::test]
    async fn denylist_dominates_allowlist() {
        let (store, _) = warden_store::open_in_memory().await.unwrap();
        let builder = GraphBuilder::new(&store);
        let config = GraphConfig {
            mode: ScopeMode::SelfOnly,
            allowlist: vec!["blocked".to_string()],
            denylist: vec!["blocked".to_string()],
            ..GraphConfig::default()
        };
        let result = builder.build("owner", &config).await;
        assert!(!result.authors.iter().any(|(p, _, _)| p == "blocked"));
    }
}
