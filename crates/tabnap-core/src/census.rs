//! Census selection: which tabs exceed the retained-tab ceiling.
//!
//! Input is one entry per enumerated web tab, in enumeration order, with the
//! tab's `introduce` answer if it gave one. Tabs that did not answer (closed,
//! discarded, timed out) are never candidates.

use serde::{Deserialize, Serialize};

use crate::types::{EligibilityReport, TabId};

/// Below this many open web tabs the census does nothing.
pub const MIN_OPEN_TABS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CensusEntry {
    pub tab_id: TabId,
    pub active: bool,
    pub report: Option<EligibilityReport>,
}

impl CensusEntry {
    /// Loaded, not excepted, not focused.
    pub fn is_retained(&self) -> bool {
        !self.active
            && self
                .report
                .is_some_and(|r| r.ready && !r.exception)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CensusOutcome {
    /// Web tabs enumerated.
    pub open: usize,
    /// Entries that passed the retained filter.
    pub eligible: usize,
    /// Oldest-loaded excess tabs to force-discard.
    pub candidates: Vec<TabId>,
}

/// Rank retained tabs newest-first and return everything past `ceiling`.
///
/// Ties in the load timestamp keep enumeration order (stable sort).
pub fn evaluate(entries: &[CensusEntry], ceiling: usize) -> CensusOutcome {
    let open = entries.len();
    if open < MIN_OPEN_TABS {
        return CensusOutcome {
            open,
            ..Default::default()
        };
    }

    let mut retained: Vec<(TabId, u64)> = entries
        .iter()
        .filter(|e| e.is_retained())
        .filter_map(|e| e.report.map(|r| (e.tab_id, r.now)))
        .collect();
    let eligible = retained.len();

    if eligible <= ceiling {
        return CensusOutcome {
            open,
            eligible,
            candidates: Vec::new(),
        };
    }

    retained.sort_by(|a, b| b.1.cmp(&a.1));
    let candidates = retained.into_iter().skip(ceiling).map(|(id, _)| id).collect();

    CensusOutcome {
        open,
        eligible,
        candidates,
    }
}
