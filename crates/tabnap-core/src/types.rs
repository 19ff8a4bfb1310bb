use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

// ─── Tab identity ─────────────────────────────────────────────────

#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TabId(pub u64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TabId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(TabId)
            .map_err(|_| CoreError::InvalidTabId(s.to_string()))
    }
}

// ─── Load status ──────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabStatus {
    Loading,
    #[default]
    Complete,
}

// ─── Snapshot ─────────────────────────────────────────────────────

/// Live record of one browser tab as held by the coordinator's registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabSnapshot {
    pub tab_id: TabId,
    #[serde(default)]
    pub window_id: u64,
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub audible: bool,
    #[serde(default)]
    pub fav_icon_url: Option<String>,
    #[serde(default)]
    pub discarded: bool,
    #[serde(default)]
    pub status: TabStatus,
}

impl TabSnapshot {
    /// Web tabs are the only ones agents run in (`*://*/*` in extension terms).
    pub fn is_web(&self) -> bool {
        is_web_url(&self.url)
    }

    /// Apply a partial update; returns true if anything changed.
    pub fn apply(&mut self, update: &TabUpdate) -> bool {
        let before = self.clone();
        if let Some(window_id) = update.window_id {
            self.window_id = window_id;
        }
        if let Some(index) = update.index {
            self.index = index;
        }
        if let Some(ref url) = update.url {
            self.url.clone_from(url);
        }
        if let Some(ref title) = update.title {
            self.title.clone_from(title);
        }
        if let Some(pinned) = update.pinned {
            self.pinned = pinned;
        }
        if let Some(audible) = update.audible {
            self.audible = audible;
        }
        if let Some(ref fav) = update.fav_icon_url {
            self.fav_icon_url = Some(fav.clone());
        }
        if let Some(discarded) = update.discarded {
            self.discarded = discarded;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        *self != before
    }
}

/// True for `http` and `https` URLs.
pub fn is_web_url(url: &str) -> bool {
    url::Url::parse(url).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}

/// Partial tab change as reported by the browser (`tabs.onUpdated`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabUpdate {
    pub tab_id: TabId,
    #[serde(default)]
    pub window_id: Option<u64>,
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub pinned: Option<bool>,
    #[serde(default)]
    pub audible: Option<bool>,
    #[serde(default)]
    pub fav_icon_url: Option<String>,
    #[serde(default)]
    pub discarded: Option<bool>,
    #[serde(default)]
    pub status: Option<TabStatus>,
}

impl TabUpdate {
    /// A navigation started: a new document will replace the current one.
    pub fn is_navigation(&self) -> bool {
        self.status == Some(TabStatus::Loading) && self.url.is_some()
    }

    /// The tab came back from the discarded state.
    pub fn is_undiscard(&self) -> bool {
        self.discarded == Some(false)
    }

    pub fn is_load_complete(&self) -> bool {
        self.status == Some(TabStatus::Complete)
    }
}

// ─── Introspection ────────────────────────────────────────────────

/// Answer of one agent to an `introduce` query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityReport {
    /// Some exception predicate currently holds.
    pub exception: bool,
    /// The document finished loading.
    pub ready: bool,
    /// Agent load timestamp (epoch ms); recency key for the census.
    pub now: u64,
}

// ─── Host idle state ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdleState {
    Active,
    Idle,
    Locked,
}
