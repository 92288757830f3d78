//! Incremental, inline aggregate updates applied by the sync engine's
//! ingest pipeline (spec §4.7/§4.9). Kept here rather than in
//! `warden-sync` so the per-kind update rule lives next to the reconciler
//! that corrects drift in the same counters.

use warden_store::{DerivedStore, StoredEvent};

use crate::bolt11::parse_bolt11_amount_sats;

const KIND_NOTE: u64 = 1;
const KIND_REACTION: u64 = 7;
const KIND_ZAP_RECEIPT: u64 = 9735;

/// Applies the per-kind aggregate update for one ingested event, if any.
/// No-op for kinds without an aggregate effect (metadata, contacts, ...).
pub async fn apply_interaction(derived: &DerivedStore, event: &StoredEvent) -> warden_store::Result<()> {
    match event.kind {
        KIND_NOTE => {
            if let Some(target) = event.e_tags().first() {
                derived.increment_reply(target, event.created_at).await?;
            }
        }
        KIND_REACTION => {
            if let Some(target) = event.e_tags().first() {
                let emoji = if event.content.is_empty() { "+" } else { &event.content };
                derived.increment_reaction(target, emoji, event.created_at).await?;
            }
        }
        KIND_ZAP_RECEIPT => {
            if let Some(target) = event.e_tags().first() {
                let sats = event.bolt11().and_then(parse_bolt11_amount_sats).unwrap_or(0);
                derived.add_zap(target, sats, event.created_at).await?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: u64, tags: Vec<Vec<String>>, content: &str, created_at: i64) -> StoredEvent {
        StoredEvent {
            id: "e1".into(),
            pubkey: "pk1".into(),
            created_at,
            kind,
            tags,
            content: content.to_string(),
            sig: "sig".into(),
        }
    }

    #[tokio::test]
    async fn reply_increments_target_from_first_e_tag() {
        let (_, derived) = warden_store::open_in_memory().await.unwrap();
        let note = event(KIND_NOTE, vec![vec!["e".into(), "target".into()]], "hi", 100);
        apply_interaction(&derived, &note).await.unwrap();

        let agg = derived.aggregate_for("target").await.unwrap().unwrap();
        assert_eq!(agg.reply_count, 1);
    }

    #[tokio::test]
    async fn reaction_defaults_to_plus_when_content_empty() {
        let (_, derived) = warden_store::open_in_memory().await.unwrap();
        let reaction = event(KIND_REACTION, vec![vec!["e".into(), "target".into()]], "", 100);
        apply_interaction(&derived, &reaction).await.unwrap();

        let agg = derived.aggregate_for("target").await.unwrap().unwrap();
        assert_eq!(agg.reaction_counts.get("+"), Some(&1));
    }

    #[tokio::test]
    async fn zap_with_unparseable_invoice_still_raises_last_interaction() {
        let (_, derived) = warden_store::open_in_memory().await.unwrap();
        let zap = event(
            KIND_ZAP_RECEIPT,
            vec![vec!["e".into(), "target".into()], vec!["bolt11".into(), "garbage".into()]],
            "",
            500,
        );
        apply_interaction(&derived, &zap).await.unwrap();

        let agg = derived.aggregate_for("target").await.unwrap().unwrap();
        assert_eq!(agg.zap_sats_total, 0);
        assert_eq!(agg.last_interaction_at, 500);
    }
}
