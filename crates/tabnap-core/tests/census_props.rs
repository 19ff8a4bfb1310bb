use proptest::prelude::*;
use tabnap_core::census::{CensusEntry, MIN_OPEN_TABS, evaluate};
use tabnap_core::{EligibilityReport, TabId};

fn arb_entry() -> impl Strategy<Value = (bool, Option<(bool, bool, u64)>)> {
    (
        any::<bool>(),
        proptest::option::of((any::<bool>(), any::<bool>(), 0u64..50)),
    )
}

fn build(raw: Vec<(bool, Option<(bool, bool, u64)>)>) -> Vec<CensusEntry> {
    raw.into_iter()
        .enumerate()
        .map(|(i, (active, report))| CensusEntry {
            tab_id: TabId(i as u64),
            active,
            report: report.map(|(exception, ready, now)| EligibilityReport {
                exception,
                ready,
                now,
            }),
        })
        .collect()
}

proptest! {
    #[test]
    fn candidates_are_retained_and_never_active(
        raw in proptest::collection::vec(arb_entry(), 0..24),
        ceiling in 1usize..10,
    ) {
        let entries = build(raw);
        let out = evaluate(&entries, ceiling);
        for id in &out.candidates {
            let e = entries.iter().find(|e| e.tab_id == *id).expect("candidate comes from input");
            prop_assert!(!e.active);
            prop_assert!(e.is_retained());
        }
    }

    #[test]
    fn exactly_the_excess_is_selected(
        raw in proptest::collection::vec(arb_entry(), 0..24),
        ceiling in 1usize..10,
    ) {
        let entries = build(raw);
        let out = evaluate(&entries, ceiling);
        let retained = entries.iter().filter(|e| e.is_retained()).count();
        if entries.len() < MIN_OPEN_TABS {
            prop_assert!(out.candidates.is_empty());
        } else {
            prop_assert_eq!(out.eligible, retained);
            prop_assert_eq!(out.candidates.len(), retained.saturating_sub(ceiling));
        }
    }

    #[test]
    fn kept_tabs_are_never_older_than_discarded_ones(
        raw in proptest::collection::vec(arb_entry(), 4..24),
        ceiling in 1usize..10,
    ) {
        let entries = build(raw);
        let out = evaluate(&entries, ceiling);
        let now_of = |id: TabId| {
            entries
                .iter()
                .find(|e| e.tab_id == id)
                .and_then(|e| e.report)
                .map(|r| r.now)
                .unwrap_or(0)
        };
        let newest_discarded = out.candidates.iter().map(|&id| now_of(id)).max();
        if let Some(newest_discarded) = newest_discarded {
            for kept in entries
                .iter()
                .filter(|e| e.is_retained() && !out.candidates.contains(&e.tab_id))
            {
                prop_assert!(now_of(kept.tab_id) >= newest_discarded);
            }
        }
    }
}
