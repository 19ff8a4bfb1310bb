//! Shared preferences: one immutable snapshot published on a watch channel.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;

use tabnap_core::{CoreError, Preferences, PrefsDelta};

/// Default prefs file: `$XDG_CONFIG_HOME/tabnap/prefs.toml`, else
/// `$HOME/.config/tabnap/prefs.toml`.
pub fn default_prefs_path() -> PathBuf {
    if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(dir).join("tabnap/prefs.toml");
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".config/tabnap/prefs.toml")
}

#[derive(Debug, Clone)]
pub struct PrefsStore {
    tx: Arc<watch::Sender<Arc<Preferences>>>,
    path: Option<PathBuf>,
}

impl PrefsStore {
    /// In-memory store with no backing file.
    pub fn new(prefs: Preferences) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(prefs));
        Self {
            tx: Arc::new(tx),
            path: None,
        }
    }

    /// Load `path` (missing file ⇒ defaults) and remember it for reloads.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let path = path.into();
        let prefs = Preferences::load(&path)?;
        tracing::info!(
            "preferences loaded from {} (mode {}, period {}s)",
            path.display(),
            prefs.mode,
            prefs.period
        );
        let mut store = Self::new(prefs);
        store.path = Some(path);
        Ok(store)
    }

    pub fn current(&self) -> Arc<Preferences> {
        Arc::clone(&self.tx.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Preferences>> {
        self.tx.subscribe()
    }

    /// Merge a JSON patch. Subscribers are notified only if a value changed.
    pub fn apply_patch(&self, patch: &serde_json::Value) -> Result<PrefsDelta, CoreError> {
        let mut outcome = Ok(PrefsDelta::default());
        self.tx.send_if_modified(|current| match current.with_patch(patch) {
            Ok((next, delta)) => {
                let changed = !delta.is_empty();
                if changed {
                    *current = Arc::new(next);
                }
                outcome = Ok(delta);
                changed
            }
            Err(e) => {
                outcome = Err(e);
                false
            }
        });
        if let Ok(delta) = &outcome
            && !delta.is_empty()
        {
            tracing::info!("preferences updated: {}", delta.keys.join(", "));
        }
        outcome
    }

    /// Swap in a whole snapshot.
    pub fn replace(&self, prefs: Preferences) -> PrefsDelta {
        let mut delta = PrefsDelta::default();
        self.tx.send_if_modified(|current| {
            delta = current.diff(&prefs);
            if delta.is_empty() {
                return false;
            }
            *current = Arc::new(prefs);
            true
        });
        delta
    }

    /// Re-read the backing file. A store without one reports no change.
    pub fn reload(&self) -> Result<PrefsDelta, CoreError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(PrefsDelta::default());
        };
        let prefs = Preferences::load(path)?;
        let delta = self.replace(prefs);
        tracing::info!(
            "preferences reloaded from {} ({} changed)",
            path.display(),
            delta.keys.len()
        );
        Ok(delta)
    }
}
