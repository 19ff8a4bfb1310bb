//! Exception predicate breakdown.
//!
//! Each predicate names a condition that forbids discarding a tab right now.
//! Evaluation itself lives in the runtime (some predicates need a round-trip
//! to the coordinator); this module holds the result shape shared by both
//! sides.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::prefs::Preferences;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionKind {
    Audio,
    Pinned,
    Battery,
    Form,
    Whitelist,
    Notification,
}

impl ExceptionKind {
    pub const ALL: [Self; 6] = [
        Self::Audio,
        Self::Pinned,
        Self::Battery,
        Self::Form,
        Self::Whitelist,
        Self::Notification,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Pinned => "pinned",
            Self::Battery => "battery",
            Self::Form => "form",
            Self::Whitelist => "whitelist",
            Self::Notification => "notification",
        }
    }

    /// Human-readable reason logged when the predicate blocks a discard.
    pub fn reason(self) -> &'static str {
        match self {
            Self::Audio => "Audio is playing",
            Self::Pinned => "Tab is pinned",
            Self::Battery => "Power is plugged-in",
            Self::Form => "Unsaved form is detected",
            Self::Whitelist => "Hostname is in the list",
            Self::Notification => "Tab has granted notification.permission",
        }
    }

    /// Whether the governing preference lets this predicate be evaluated.
    /// The whitelist has no toggle; an empty list simply never matches.
    pub fn enabled(self, prefs: &Preferences) -> bool {
        match self {
            Self::Audio => prefs.audio,
            Self::Pinned => prefs.pinned,
            Self::Battery => prefs.battery,
            Self::Form => prefs.form,
            Self::Whitelist => !prefs.whitelist.is_empty(),
            Self::Notification => prefs.notification_permission,
        }
    }
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one evaluation of the whole predicate set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionResult {
    pub audio: bool,
    pub pinned: bool,
    pub battery: bool,
    pub form: bool,
    pub whitelist: bool,
    pub notification: bool,
}

impl ExceptionResult {
    pub fn get(&self, kind: ExceptionKind) -> bool {
        match kind {
            ExceptionKind::Audio => self.audio,
            ExceptionKind::Pinned => self.pinned,
            ExceptionKind::Battery => self.battery,
            ExceptionKind::Form => self.form,
            ExceptionKind::Whitelist => self.whitelist,
            ExceptionKind::Notification => self.notification,
        }
    }

    /// Logical OR of all predicates.
    pub fn any(&self) -> bool {
        ExceptionKind::ALL.iter().any(|&k| self.get(k))
    }

    /// Predicates that currently hold, in declaration order.
    pub fn active(&self) -> Vec<ExceptionKind> {
        ExceptionKind::ALL
            .iter()
            .copied()
            .filter(|&k| self.get(k))
            .collect()
    }

    /// Reasons of the holding predicates joined for a single log line.
    pub fn describe(&self) -> String {
        self.active()
            .iter()
            .map(|k| k.reason())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_result_blocks_nothing() {
        let r = ExceptionResult::default();
        assert!(!r.any());
        assert!(r.active().is_empty());
        assert_eq!(r.describe(), "");
    }

    #[test]
    fn any_single_predicate_blocks() {
        for kind in ExceptionKind::ALL {
            let mut r = ExceptionResult::default();
            match kind {
                ExceptionKind::Audio => r.audio = true,
                ExceptionKind::Pinned => r.pinned = true,
                ExceptionKind::Battery => r.battery = true,
                ExceptionKind::Form => r.form = true,
                ExceptionKind::Whitelist => r.whitelist = true,
                ExceptionKind::Notification => r.notification = true,
            }
            assert!(r.any(), "{kind} alone must block");
            assert_eq!(r.active(), vec![kind]);
        }
    }

    #[test]
    fn describe_lists_reasons_in_order() {
        let r = ExceptionResult {
            audio: true,
            whitelist: true,
            ..Default::default()
        };
        assert_eq!(r.describe(), "Audio is playing; Hostname is in the list");
    }

    #[test]
    fn toggles_follow_preferences() {
        let mut prefs = Preferences::default();
        assert!(ExceptionKind::Audio.enabled(&prefs));
        assert!(!ExceptionKind::Pinned.enabled(&prefs));
        assert!(!ExceptionKind::Whitelist.enabled(&prefs));
        prefs.whitelist.push("a.test".into());
        prefs.pinned = true;
        assert!(ExceptionKind::Whitelist.enabled(&prefs));
        assert!(ExceptionKind::Pinned.enabled(&prefs));
    }
}
