//! Thread resolution (spec §6.2): `thread_of(event_id)` walks `e`-tag
//! markers to find an event's root and collects every reply pointing at it.

use warden_store::{EventStore, StoreFilter, StoredEvent};

use crate::error::Result;

const KIND_NOTE: u64 = 1;

#[derive(Debug, Clone, Default)]
pub struct Thread {
    pub root: Option<StoredEvent>,
    pub replies: Vec<StoredEvent>,
}

/// NIP-10 marked convention first, falling back to the oldest (first
/// positional) `e`-tag when no tag carries an explicit "root" marker; an
/// event with no `e`-tags at all is its own root.
fn resolve_root_id(event: &StoredEvent) -> String {
    let marked = event
        .tags
        .iter()
        .find(|t| t.first().map(String::as_str) == Some("e") && t.get(3).map(String::as_str) == Some("root"));
    if let Some(tag) = marked {
        if let Some(id) = tag.get(1) {
            return id.clone();
        }
    }
    event.e_tags().first().map(|s| s.to_string()).unwrap_or_else(|| event.id.clone())
}

pub async fn thread_of(store: &EventStore, event_id: &str) -> Result<Thread> {
    let Some(event) = store
        .query(StoreFilter::new().id(event_id))
        .await?
        .into_iter()
        .next()
    else {
        return Ok(Thread::default());
    };

    let root_id = resolve_root_id(&event);
    let root = store.query(StoreFilter::new().id(&root_id)).await?.into_iter().next();
    let replies = store
        .query(StoreFilter::new().kind(KIND_NOTE).tag("e", [root_id]))
        .await?;

    Ok(Thread { root, replies })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, tags: Vec<Vec<String>>, created_at: i64) -> StoredEvent {
        StoredEvent {
            id: id.to_string(),
            pubkey: "pk".into(),
            created_at,
            kind: KIND_NOTE,
            tags,
            content: String::new(),
            sig: "sig".into(),
        }
    }

    #[tokio::test]
    async fn event_with_no_e_tags_is_its_own_root() {
        let (store, _) = warden_store::open_in_memory().await.unwrap();
        let root_id = "a".repeat(64);
        store.put_event(event(&root_id, vec![], 100)).await.unwrap();

        let thread = thread_of(&store, &root_id).await.unwrap();
        assert_eq!(thread.root.unwrap().id, root_id);
        assert!(thread.replies.is_empty());
    }

    #[tokio::test]
    async fn reply_resolves_root_via_positional_e_tag() {
        let (store, _) = warden_store::open_in_memory().await.unwrap();
        let root_id = "a".repeat(64);
        let reply_id = "b".repeat(64);
        store.put_event(event(&root_id, vec![], 100)).await.unwrap();
        store
            .put_event(event(&reply_id, vec![vec!["e".into(), root_id.clone()]], 200))
            .await
            .unwrap();

        let thread = thread_of(&store, &reply_id).await.unwrap();
        assert_eq!(thread.root.unwrap().id, root_id);
        assert_eq!(thread.replies.len(), 1);
        assert_eq!(thread.replies[0].id, reply_id);
    }

    #[tokio::test]
    async fn marked_root_tag_wins_over_positional_order() {
        let (store, _) = warden_store::open_in_memory().await.unwrap();
        let root_id = "a".repeat(64);
        let parent_id = "b".repeat(64);
        let reply_id = "c".repeat(64);
        store.put_event(event(&root_id, vec![], 100)).await.unwrap();
        store
            .put_event(event(
                &reply_id,
                vec![
                    vec!["e".into(), root_id.clone(), String::new(), "root".into()],
                    vec!["e".into(), parent_id, String::new(), "reply".into()],
                ],
                300,
            ))
            .await
            .unwrap();

        let thread = thread_of(&store, &reply_id).await.unwrap();
        assert_eq!(thread.root.unwrap().id, root_id);
    }
}
