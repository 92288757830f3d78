use serde::Deserialize;

/// Retention configuration surface (spec §6.4, §4.10). The two modes are
/// configured independently and can coexist; per the open question in
/// spec §9, simple `keep_days` acts as a floor applied before rule-based
/// caps run.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    pub keep_days: Option<u32>,
    #[serde(default)]
    pub advanced: Option<AdvancedRetention>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdvancedRetention {
    pub rules: Vec<Rule>,
    pub caps: Caps,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Caps {
    pub max_total_events: Option<u64>,
    pub max_storage_bytes: Option<u64>,
    pub max_per_kind: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    pub name: String,
    pub priority: i64,
    pub condition: Condition,
    pub action: Action,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    RetainUntil(i64),
    Protect,
}

/// Boolean tree of gates (spec §4.10): time / size / kind / social distance
/// / reference / logical composition.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),

    CreatedBefore(i64),
    CreatedAfter(i64),
    AgeMinSeconds(i64),
    AgeMaxSeconds(i64),

    ContentLengthMin(usize),
    ContentLengthMax(usize),
    TagCountMin(usize),
    TagCountMax(usize),

    KindIn(Vec<u64>),
    KindNotIn(Vec<u64>),

    SocialDistance(u32),
    Mutual,
    PubkeyIn(Vec<String>),

    ReferencesOwner,
    ReplyCountMin(u64),
    ZapSatsMin(u64),
}
