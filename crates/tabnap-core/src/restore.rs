//! Pre-discard URL cache for hosts without a reliable reload-on-activate.

use std::collections::HashMap;

use crate::types::TabId;

#[derive(Debug, Clone, Default)]
pub struct RestoreCache {
    urls: HashMap<TabId, String>,
}

impl RestoreCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the URL a tab showed when it was discarded.
    pub fn record(&mut self, tab_id: TabId, url: impl Into<String>) {
        self.urls.insert(tab_id, url.into());
    }

    /// Consume the entry for a reactivated tab.
    pub fn take(&mut self, tab_id: TabId) -> Option<String> {
        self.urls.remove(&tab_id)
    }

    pub fn forget(&mut self, tab_id: TabId) {
        self.urls.remove(&tab_id);
    }

    pub fn contains(&self, tab_id: TabId) -> bool {
        self.urls.contains_key(&tab_id)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_take_forget() {
        let mut cache = RestoreCache::new();
        cache.record(TabId(1), "https://a.test/");
        cache.record(TabId(2), "https://b.test/");
        assert!(cache.contains(TabId(1)));

        assert_eq!(cache.take(TabId(1)).as_deref(), Some("https://a.test/"));
        assert_eq!(cache.take(TabId(1)), None, "take consumes");

        cache.forget(TabId(2));
        assert!(cache.is_empty());
    }

    #[test]
    fn rediscard_overwrites_url() {
        let mut cache = RestoreCache::new();
        cache.record(TabId(1), "https://old.test/");
        cache.record(TabId(1), "https://new.test/");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.take(TabId(1)).as_deref(), Some("https://new.test/"));
    }
}
