use warden_store::Aggregate;

/// `InteractionScore(e) = reply-count(e) + reaction-total(e) + zap-sats-total(e) / 1000`
/// (spec §4.9), integer arithmetic throughout.
pub fn interaction_score(aggregate: &Aggregate) -> u64 {
    aggregate.reply_count + aggregate.reaction_total + aggregate.zap_sats_total / 1000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn combines_counters_with_integer_zap_division() {
        let aggregate = Aggregate {
            event_id: "e1".into(),
            reply_count: 3,
            reaction_total: 5,
            reaction_counts: HashMap::new(),
            zap_sats_total: 2500,
            last_interaction_at: 0,
        };
        assert_eq!(interaction_score(&aggregate), 3 + 5 + 2);
    }
}
