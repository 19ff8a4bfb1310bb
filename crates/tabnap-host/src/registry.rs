//! Live tab registry: the coordinator's authoritative view of open tabs.

use std::collections::HashMap;

use tabnap_core::{TabId, TabSnapshot, TabUpdate};

/// Result of marking a tab active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activation {
    /// Previously active tab of the same window, if it changed.
    pub previous: Option<TabId>,
    /// False if the tab is unknown.
    pub known: bool,
}

/// Mirrors the browser's tab list. One active tab per window.
#[derive(Debug, Clone, Default)]
pub struct TabRegistry {
    tabs: HashMap<TabId, TabSnapshot>,
}

impl TabRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a tab. A newly active tab deactivates its window;
    /// the tab it displaced is returned.
    pub fn upsert(&mut self, snapshot: TabSnapshot) -> Option<TabId> {
        let previous = if snapshot.active {
            self.deactivate_window(snapshot.window_id, snapshot.tab_id)
        } else {
            None
        };
        self.tabs.insert(snapshot.tab_id, snapshot);
        previous
    }

    /// Apply a partial update. Returns the updated snapshot, or `None` if
    /// the tab is unknown.
    pub fn apply(&mut self, update: &TabUpdate) -> Option<&TabSnapshot> {
        let tab = self.tabs.get_mut(&update.tab_id)?;
        tab.apply(update);
        Some(tab)
    }

    pub fn activate(&mut self, tab_id: TabId) -> Activation {
        let Some(window_id) = self.tabs.get(&tab_id).map(|t| t.window_id) else {
            return Activation {
                previous: None,
                known: false,
            };
        };
        let previous = self.deactivate_window(window_id, tab_id);
        if let Some(tab) = self.tabs.get_mut(&tab_id) {
            tab.active = true;
        }
        Activation {
            previous,
            known: true,
        }
    }

    pub fn remove(&mut self, tab_id: TabId) -> Option<TabSnapshot> {
        self.tabs.remove(&tab_id)
    }

    pub fn get(&self, tab_id: TabId) -> Option<&TabSnapshot> {
        self.tabs.get(&tab_id)
    }

    pub fn set_discarded(&mut self, tab_id: TabId, discarded: bool) -> bool {
        match self.tabs.get_mut(&tab_id) {
            Some(tab) => {
                tab.discarded = discarded;
                true
            }
            None => false,
        }
    }

    /// All tabs in enumeration order: window, strip index, id.
    pub fn list(&self) -> Vec<TabSnapshot> {
        let mut tabs: Vec<TabSnapshot> = self.tabs.values().cloned().collect();
        tabs.sort_by_key(|t| (t.window_id, t.index, t.tab_id));
        tabs
    }

    /// Web tabs in enumeration order, optionally skipping discarded ones.
    pub fn web_tabs(&self, include_discarded: bool) -> Vec<TabSnapshot> {
        self.list()
            .into_iter()
            .filter(|t| t.is_web() && (include_discarded || !t.discarded))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn discarded_count(&self) -> usize {
        self.tabs.values().filter(|t| t.discarded).count()
    }

    fn deactivate_window(&mut self, window_id: u64, except: TabId) -> Option<TabId> {
        let mut previous = None;
        for tab in self.tabs.values_mut() {
            if tab.window_id == window_id && tab.active && tab.tab_id != except {
                tab.active = false;
                previous = Some(tab.tab_id);
            }
        }
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabnap_core::TabStatus;

    fn tab(id: u64, window: u64, index: u32, url: &str) -> TabSnapshot {
        TabSnapshot {
            tab_id: TabId(id),
            window_id: window,
            index,
            url: url.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn list_follows_enumeration_order() {
        let mut reg = TabRegistry::new();
        reg.upsert(tab(5, 2, 0, "https://e.test/"));
        reg.upsert(tab(9, 1, 1, "https://b.test/"));
        reg.upsert(tab(3, 1, 0, "https://a.test/"));
        let ids: Vec<TabId> = reg.list().iter().map(|t| t.tab_id).collect();
        assert_eq!(ids, vec![TabId(3), TabId(9), TabId(5)]);
    }

    #[test]
    fn activation_is_per_window() {
        let mut reg = TabRegistry::new();
        reg.upsert(TabSnapshot {
            active: true,
            ..tab(1, 1, 0, "https://a.test/")
        });
        reg.upsert(tab(2, 1, 1, "https://b.test/"));
        reg.upsert(TabSnapshot {
            active: true,
            ..tab(3, 2, 0, "https://c.test/")
        });

        let act = reg.activate(TabId(2));
        assert!(act.known);
        assert_eq!(act.previous, Some(TabId(1)));
        assert!(!reg.get(TabId(1)).expect("tab 1").active);
        assert!(reg.get(TabId(2)).expect("tab 2").active);
        assert!(reg.get(TabId(3)).expect("tab 3").active, "other window untouched");

        let again = reg.activate(TabId(2));
        assert_eq!(again.previous, None);
    }

    #[test]
    fn activate_unknown_tab() {
        let mut reg = TabRegistry::new();
        let act = reg.activate(TabId(42));
        assert!(!act.known);
        assert_eq!(act.previous, None);
    }

    #[test]
    fn upsert_active_deactivates_window() {
        let mut reg = TabRegistry::new();
        reg.upsert(TabSnapshot {
            active: true,
            ..tab(1, 1, 0, "https://a.test/")
        });
        let displaced = reg.upsert(TabSnapshot {
            active: true,
            ..tab(2, 1, 1, "https://b.test/")
        });
        assert_eq!(displaced, Some(TabId(1)));
        assert!(!reg.get(TabId(1)).expect("tab 1").active);
    }

    #[test]
    fn web_tabs_filter() {
        let mut reg = TabRegistry::new();
        reg.upsert(tab(1, 1, 0, "https://a.test/"));
        reg.upsert(tab(2, 1, 1, "chrome://newtab/"));
        reg.upsert(TabSnapshot {
            discarded: true,
            ..tab(3, 1, 2, "https://c.test/")
        });
        assert_eq!(reg.web_tabs(true).len(), 2);
        assert_eq!(reg.web_tabs(false).len(), 1);
        assert_eq!(reg.discarded_count(), 1);
    }

    #[test]
    fn apply_and_remove() {
        let mut reg = TabRegistry::new();
        reg.upsert(tab(1, 1, 0, "https://a.test/"));
        let update = TabUpdate {
            tab_id: TabId(1),
            status: Some(TabStatus::Loading),
            url: Some("https://next.test/".into()),
            ..Default::default()
        };
        let snap = reg.apply(&update).expect("known");
        assert_eq!(snap.url, "https://next.test/");
        assert!(reg.apply(&TabUpdate {
            tab_id: TabId(2),
            ..Default::default()
        })
        .is_none());

        assert!(reg.set_discarded(TabId(1), true));
        assert!(reg.remove(TabId(1)).is_some());
        assert!(reg.is_empty());
        assert!(!reg.set_discarded(TabId(1), false));
    }
}
