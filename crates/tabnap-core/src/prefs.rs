//! User preferences: the read-only input of the decision engine.
//!
//! A `Preferences` value is an immutable snapshot. Changes never mutate a
//! snapshot in place; they produce a new one together with a [`PrefsDelta`]
//! naming the keys that actually changed, so subscribers can decide whether
//! to re-run their checks.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Default census ceiling.
pub const DEFAULT_NUMBER: usize = 6;

/// Default hidden period before a tab becomes eligible (seconds).
pub const DEFAULT_PERIOD_SECS: u64 = 10 * 60;

// ─── Mode ─────────────────────────────────────────────────────────

/// Global discarding strategy.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DiscardMode {
    /// Per-tab idle timer only.
    #[default]
    TimeBased,
    /// Census ceiling only; the timer path runs for bypassed requests.
    NumberBased,
    /// Per-tab idle timer, restricted to tabs matching `whitelist-url`.
    UrlBased,
}

impl DiscardMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TimeBased => "time-based",
            Self::NumberBased => "number-based",
            Self::UrlBased => "url-based",
        }
    }
}

impl fmt::Display for DiscardMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown mode strings (including the legacy `timer-based`) mean time-based.
impl From<String> for DiscardMode {
    fn from(s: String) -> Self {
        match s.as_str() {
            "number-based" => Self::NumberBased,
            "url-based" => Self::UrlBased,
            _ => Self::TimeBased,
        }
    }
}

impl From<DiscardMode> for String {
    fn from(mode: DiscardMode) -> Self {
        mode.as_str().to_string()
    }
}

// ─── Preferences ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Seconds a tab must stay hidden before it is discarded (0 = never).
    pub period: u64,
    /// Do not discard while audio is playing.
    pub audio: bool,
    /// Do not discard pinned tabs.
    pub pinned: bool,
    /// Do not discard tabs with unsaved form edits.
    pub form: bool,
    /// Do not discard while the device is on external power.
    pub battery: bool,
    /// Do not discard tabs that were granted notification permission.
    #[serde(rename = "notification.permission")]
    pub notification_permission: bool,
    /// Log agent decisions at info level.
    pub log: bool,
    pub mode: DiscardMode,
    /// Hostnames, or `re:`-prefixed regexes, never to discard.
    pub whitelist: Vec<String>,
    /// Hostnames, or `re:`-prefixed regexes, eligible in url-based mode.
    #[serde(rename = "whitelist-url")]
    pub whitelist_url: Vec<String>,
    /// Census ceiling for number-based mode.
    pub number: usize,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD_SECS,
            audio: true,
            pinned: false,
            form: true,
            battery: false,
            notification_permission: false,
            log: false,
            mode: DiscardMode::TimeBased,
            whitelist: Vec::new(),
            whitelist_url: Vec::new(),
            number: DEFAULT_NUMBER,
        }
    }
}

impl Preferences {
    /// Parse a TOML document; missing keys take their defaults.
    pub fn from_toml(s: &str) -> Result<Self, CoreError> {
        let prefs: Self = toml::from_str(s)?;
        prefs.validate()?;
        Ok(prefs)
    }

    /// Load preferences from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(CoreError::PrefsIo(e)),
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.number == 0 {
            return Err(CoreError::InvalidPrefs("number must be at least 1".into()));
        }
        Ok(())
    }

    pub fn period_ms(&self) -> u64 {
        self.period.saturating_mul(1000)
    }

    /// Merge a JSON object of `key: value` pairs into a new snapshot.
    ///
    /// Keys use their storage names (`notification.permission`,
    /// `whitelist-url`). Unknown keys are ignored.
    pub fn with_patch(&self, patch: &serde_json::Value) -> Result<(Self, PrefsDelta), CoreError> {
        let patch = patch
            .as_object()
            .ok_or_else(|| CoreError::InvalidPrefs("patch must be a JSON object".into()))?;

        let mut merged = self.to_json()?;
        if let serde_json::Value::Object(ref mut map) = merged {
            for (key, value) in patch {
                map.insert(key.clone(), value.clone());
            }
        }

        let next: Self = serde_json::from_value(merged)
            .map_err(|e| CoreError::InvalidPrefs(e.to_string()))?;
        next.validate()?;
        let delta = self.diff(&next);
        Ok((next, delta))
    }

    /// Keys whose values differ between `self` and `other`.
    pub fn diff(&self, other: &Self) -> PrefsDelta {
        let (Ok(serde_json::Value::Object(a)), Ok(serde_json::Value::Object(b))) =
            (self.to_json(), other.to_json())
        else {
            return PrefsDelta::default();
        };

        let keys = a
            .iter()
            .filter(|(k, v)| b.get(k.as_str()) != Some(*v))
            .map(|(k, _)| k.clone())
            .collect();
        PrefsDelta { keys }
    }

    fn to_json(&self) -> Result<serde_json::Value, CoreError> {
        serde_json::to_value(self).map_err(|e| CoreError::InvalidPrefs(e.to_string()))
    }
}

// ─── Delta ────────────────────────────────────────────────────────

/// Storage keys changed by one preferences update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrefsDelta {
    pub keys: Vec<String>,
}

impl PrefsDelta {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn touches(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    /// A change to `period` or `mode` requires agents to re-check.
    pub fn touches_schedule(&self) -> bool {
        self.touches("period") || self.touches("mode")
    }
}
