/// Query shape for [`crate::event_store::EventStore::query`], mirroring the
/// fluent builder on `nostr::Filter` (`.author()`, `.kind()`, `.tag()`, ...)
/// but built directly against our own storage schema.
#[derive(Debug, Clone, Default)]
pub struct StoreFilter {
    pub ids: Vec<String>,
    pub authors: Vec<String>,
    pub kinds: Vec<u64>,
    pub tags: Vec<(String, Vec<String>)>,
    pub since: Option<i64>,
    pub until: Option<i64>,
    pub search: Option<String>,
    pub limit: Option<usize>,
}

impl StoreFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.ids.push(id.into());
        self
    }

    pub fn author(mut self, pubkey: impl Into<String>) -> Self {
        self.authors.push(pubkey.into());
        self
    }

    pub fn authors(mut self, pubkeys: impl IntoIterator<Item = String>) -> Self {
        self.authors.extend(pubkeys);
        self
    }

    pub fn kind(mut self, kind: u64) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn kinds(mut self, kinds: impl IntoIterator<Item = u64>) -> Self {
        self.kinds.extend(kinds);
        self
    }

    /// Match events carrying a tag `name` with any value in `values`.
    pub fn tag(mut self, name: impl Into<String>, values: impl IntoIterator<Item = String>) -> Self {
        self.tags.push((name.into(), values.into_iter().collect()));
        self
    }

    pub fn since(mut self, ts: i64) -> Self {
        self.since = Some(ts);
        self
    }

    pub fn until(mut self, ts: i64) -> Self {
        self.until = Some(ts);
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
