//! Retention engine (spec §4.10, module C10): a time-based floor plus an
//! optional priority-rule engine, both enforced by deleting rows from
//! [`EventStore`] and recording the decision in [`DerivedStore`].

use std::collections::HashMap;

use tracing::instrument;
use warden_store::{Aggregate, DerivedStore, EventStore, GraphNode, RetentionDecision, StoreFilter, StoredEvent};

use crate::config::{Action, Caps, Condition, Rule};
use crate::error::Result;

const SECONDS_PER_DAY: i64 = 86_400;

/// Social-graph + ownership context the rule engine's gates read from.
pub struct EvalContext<'a> {
    pub owner_pubkey: &'a str,
    pub graph: &'a HashMap<String, GraphNode>,
    pub now: i64,
}

impl<'a> EvalContext<'a> {
    fn social_distance(&self, pubkey: &str) -> Option<u32> {
        if pubkey == self.owner_pubkey {
            return Some(0);
        }
        self.graph.get(pubkey).map(|n| n.depth)
    }

    fn is_mutual(&self, pubkey: &str) -> bool {
        self.graph.get(pubkey).map(|n| n.mutual).unwrap_or(false)
    }
}

/// Deletes events older than `keep_days`, skipping any event the rule
/// engine has separately flagged `protected`. This floor runs before any
/// rule-based cap enforcement (spec §9 open question: simple keep-days acts
/// as a floor, not a ceiling the rule engine can override).
#[instrument(skip(store, derived))]
pub async fn simple_prune(store: &EventStore, derived: &DerivedStore, keep_days: u32, now: i64) -> Result<u64> {
    let cutoff = now - keep_days as i64 * SECONDS_PER_DAY;
    let protected = derived.protected_event_ids().await?;
    let stale = store.query(StoreFilter::new().until(cutoff)).await?;

    let mut deleted = 0;
    for event in stale {
        if protected.contains(&event.id) {
            continue;
        }
        if store.delete_by_id(&event.id).await? {
            deleted += 1;
        }
    }
    Ok(deleted)
}

/// Evaluates `event` against `rules` (assumed pre-sorted by descending
/// priority) and returns the first matching rule's action, or `None` if no
/// rule matched (default: eligible for normal expiry, not separately
/// protected or pinned).
pub fn evaluate_event<'r>(
    event: &StoredEvent,
    aggregate: Option<&Aggregate>,
    ctx: &EvalContext,
    rules: &'r [Rule],
) -> Option<&'r Rule> {
    rules.iter().find(|rule| eval_condition(&rule.condition, event, aggregate, ctx))
}

fn eval_condition(condition: &Condition, event: &StoredEvent, aggregate: Option<&Aggregate>, ctx: &EvalContext) -> bool {
    match condition {
        Condition::And(children) => children.iter().all(|c| eval_condition(c, event, aggregate, ctx)),
        Condition::Or(children) => children.iter().any(|c| eval_condition(c, event, aggregate, ctx)),
        Condition::Not(inner) => !eval_condition(inner, event, aggregate, ctx),

        Condition::CreatedBefore(ts) => event.created_at < *ts,
        Condition::CreatedAfter(ts) => event.created_at > *ts,
        Condition::AgeMinSeconds(secs) => ctx.now - event.created_at >= *secs,
        Condition::AgeMaxSeconds(secs) => ctx.now - event.created_at <= *secs,

        Condition::ContentLengthMin(n) => event.content.len() >= *n,
        Condition::ContentLengthMax(n) => event.content.len() <= *n,
        Condition::TagCountMin(n) => event.tags.len() >= *n,
        Condition::TagCountMax(n) => event.tags.len() <= *n,

        Condition::KindIn(kinds) => kinds.contains(&event.kind),
        Condition::KindNotIn(kinds) => !kinds.contains(&event.kind),

        Condition::SocialDistance(d) => ctx.social_distance(&event.pubkey) == Some(*d),
        Condition::Mutual => ctx.is_mutual(&event.pubkey),
        Condition::PubkeyIn(list) => list.iter().any(|p| p == &event.pubkey),

        Condition::ReferencesOwner => {
            event.pubkey == ctx.owner_pubkey || event.tag_values("p").any(|p| p == ctx.owner_pubkey)
        }
        Condition::ReplyCountMin(n) => aggregate.map(|a| a.reply_count >= *n).unwrap_or(false),
        Condition::ZapSatsMin(n) => aggregate.map(|a| a.zap_sats_total >= *n).unwrap_or(false),
    }
}

/// Ranking weight for cap-based eviction: lower score evicts first. Weighs
/// distance from the owner above interaction volume above raw age, matching
/// the priority order in spec §4.10's cap-enforcement note.
fn eviction_score(event: &StoredEvent, aggregate: Option<&Aggregate>, ctx: &EvalContext) -> i64 {
    let distance = ctx.social_distance(&event.pubkey).unwrap_or(u32::MAX / 2) as i64;
    let interaction = aggregate
        .map(|a| a.reply_count + a.reaction_total + a.zap_sats_total / 1000)
        .unwrap_or(0) as i64;
    let age = ctx.now - event.created_at;

    distance * 1_000_000 - interaction * 1_000 + age.max(0) / SECONDS_PER_DAY
}

/// Runs the rule engine over every currently-stored event, recording each
/// decision and deleting events with no matching rule whose `retain_until`
/// has passed. Rules are evaluated in descending-priority order; `rules`
/// need not already be sorted.
#[instrument(skip(store, derived, rules, ctx))]
pub async fn apply_rules(
    store: &EventStore,
    derived: &DerivedStore,
    rules: &[Rule],
    ctx: &EvalContext<'_>,
) -> Result<u64> {
    let mut sorted = rules.to_vec();
    sorted.sort_by(|a, b| b.priority.cmp(&a.priority));

    let events = store.query(StoreFilter::new()).await?;
    let mut deleted = 0;

    for event in events {
        let aggregate = derived.aggregate_for(&event.id).await?;
        let matched = evaluate_event(&event, aggregate.as_ref(), ctx, &sorted);

        let (protected, retain_until, rule_name, priority) = match matched {
            Some(rule) => match &rule.action {
                Action::Protect => (true, None, rule.name.clone(), rule.priority),
                Action::RetainUntil(ts) => (false, Some(*ts), rule.name.clone(), rule.priority),
            },
            None => (false, None, String::from("default"), i64::MIN),
        };

        derived
            .record_retention_decision(RetentionDecision {
                event_id: event.id.clone(),
                rule_name,
                priority,
                retain_until,
                score: eviction_score(&event, aggregate.as_ref(), ctx),
                protected,
                last_evaluated_at: ctx.now,
            })
            .await?;

        let expired = match retain_until {
            Some(ts) => ctx.now >= ts,
            None => matched.is_none(),
        };
        if !protected && expired && store.delete_by_id(&event.id).await? {
            deleted += 1;
        }
    }

    Ok(deleted)
}

/// Evicts events by ascending [`eviction_score`] (least owner-relevant
/// first) until every configured cap is satisfied. Protected events are
/// never evicted even if caps remain exceeded.
#[instrument(skip(store, derived, ctx))]
pub async fn enforce_caps(store: &EventStore, derived: &DerivedStore, caps: &Caps, ctx: &EvalContext<'_>) -> Result<u64> {
    let protected = derived.protected_event_ids().await?;
    let mut deleted = 0;

    if let Some(max_total) = caps.max_total_events {
        let events = store.query(StoreFilter::new()).await?;
        deleted += evict_until(store, derived, events, &protected, ctx, max_total as usize).await?;
    }

    if let Some(max_per_kind) = caps.max_per_kind {
        let events = store.query(StoreFilter::new()).await?;
        let mut by_kind: HashMap<u64, Vec<StoredEvent>> = HashMap::new();
        for event in events {
            by_kind.entry(event.kind).or_default().push(event);
        }
        for group in by_kind.into_values() {
            deleted += evict_until(store, derived, group, &protected, ctx, max_per_kind as usize).await?;
        }
    }

    // Storage-byte accounting isn't tracked per event; this cap is a future
    // extension point once row size is exposed by the store.
    let _ = caps.max_storage_bytes;
    Ok(deleted)
}

/// Deletes the lowest-scoring (least owner-relevant) events in `events`
/// until at most `cap` remain, skipping protected ids.
async fn evict_until(
    store: &EventStore,
    derived: &DerivedStore,
    events: Vec<StoredEvent>,
    protected: &std::collections::HashSet<String>,
    ctx: &EvalContext<'_>,
    cap: usize,
) -> Result<u64> {
    if events.len() <= cap {
        return Ok(0);
    }

    let mut scored = Vec::with_capacity(events.len());
    for event in &events {
        let aggregate = derived.aggregate_for(&event.id).await?;
        scored.push((eviction_score(event, aggregate.as_ref(), ctx), event.clone()));
    }
    scored.sort_by_key(|(score, _)| *score);

    let mut deleted = 0;
    let mut remaining = events.len();
    for (_, event) in scored {
        if remaining <= cap {
            break;
        }
        if protected.contains(&event.id) {
            continue;
        }
        if store.delete_by_id(&event.id).await? {
            deleted += 1;
            remaining -= 1;
        }
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Action, Condition, Rule};

    fn event(id: &str, pubkey: &str, kind: u64, created_at: i64) -> StoredEvent {
        StoredEvent {
            id: id.to_string(),
            pubkey: pubkey.to_string(),
            created_at,
            kind,
            tags: vec![],
            content: String::new(),
            sig: "sig".into(),
        }
    }

    const DAY: i64 = SECONDS_PER_DAY;

    #[tokio::test]
    async fn simple_prune_respects_keep_days_floor() {
        let (store, derived) = warden_store::open_in_memory().await.unwrap();
        let now = 1_000_000i64;
        store.put_event(event(&"a".repeat(64), "pk", 1, now - 40 * DAY)).await.unwrap();
        store.put_event(event(&"b".repeat(64), "pk", 1, now - 20 * DAY)).await.unwrap();

        let deleted = simple_prune(&store, &derived, 30, now).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.count(StoreFilter::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn simple_prune_skips_protected_events() {
        let (store, derived) = warden_store::open_in_memory().await.unwrap();
        let now = 1_000_000i64;
        let old_id = "a".repeat(64);
        store.put_event(event(&old_id, "pk", 1, now - 40 * DAY)).await.unwrap();
        derived
            .record_retention_decision(RetentionDecision {
                event_id: old_id.clone(),
                rule_name: "pin".into(),
                priority: 100,
                retain_until: None,
                score: 0,
                protected: true,
                last_evaluated_at: now,
            })
            .await
            .unwrap();

        let deleted = simple_prune(&store, &derived, 30, now).await.unwrap();
        assert_eq!(deleted, 0);
        assert_eq!(store.count(StoreFilter::new()).await.unwrap(), 1);
    }

    #[test]
    fn rule_priority_picks_highest_first_match() {
        let e = event(&"a".repeat(64), "owner", 1, 0);
        let graph = HashMap::new();
        let ctx = EvalContext { owner_pubkey: "owner", graph: &graph, now: 100 };

        let rules = vec![
            Rule { name: "low".into(), priority: 1, condition: Condition::KindIn(vec![1]), action: Action::RetainUntil(5) },
            Rule { name: "high".into(), priority: 10, condition: Condition::ReferencesOwner, action: Action::Protect },
        ];
        let mut sorted = rules;
        sorted.sort_by(|a, b| b.priority.cmp(&a.priority));

        let matched = evaluate_event(&e, None, &ctx, &sorted).unwrap();
        assert_eq!(matched.name, "high");
    }

    #[test]
    fn no_matching_rule_is_default_eligible() {
        let e = event(&"a".repeat(64), "stranger", 1, 0);
        let graph = HashMap::new();
        let ctx = EvalContext { owner_pubkey: "owner", graph: &graph, now: 100 };
        let rules = vec![Rule {
            name: "only-owner".into(),
            priority: 1,
            condition: Condition::ReferencesOwner,
            action: Action::Protect,
        }];
        assert!(evaluate_event(&e, None, &ctx, &rules).is_none());
    }

    #[tokio::test]
    async fn caps_evict_least_relevant_events_first() {
        let (store, derived) = warden_store::open_in_memory().await.unwrap();
        let now = 1_000_000i64;
        // `stranger` is two hops out, `owner` events are distance 0.
        store.put_event(event(&"a".repeat(64), "owner", 1, now - 3 * DAY)).await.unwrap();
        store.put_event(event(&"b".repeat(64), "owner", 1, now - 2 * DAY)).await.unwrap();
        store.put_event(event(&"c".repeat(64), "stranger", 1, now - DAY)).await.unwrap();

        let graph = HashMap::from([(
            "stranger".to_string(),
            GraphNode { pubkey: "stranger".into(), depth: 2, mutual: false, last_seen: now },
        )]);
        let ctx = EvalContext { owner_pubkey: "owner", graph: &graph, now };
        let caps = Caps { max_total_events: Some(2), max_storage_bytes: None, max_per_kind: None };

        let deleted = enforce_caps(&store, &derived, &caps, &ctx).await.unwrap();
        assert_eq!(deleted, 1);
        let remaining = store.query(StoreFilter::new()).await.unwrap();
        assert!(!remaining.iter().any(|e| e.pubkey == "stranger"));
    }
}
