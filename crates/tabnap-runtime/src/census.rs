//! Census plumbing: debounced triggering and the introduction fan-out.
//!
//! Selection itself is pure and lives in `tabnap_core::census`.

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;

use tabnap_core::TabId;
use tabnap_core::census::CensusEntry;

use crate::agent::AgentHandle;

pub const DEFAULT_DEBOUNCE_MS: u64 = 500;
pub const DEFAULT_INTRODUCE_TIMEOUT_MS: u64 = 1_000;

/// Cheap handle used by event handlers to request a census.
#[derive(Debug, Clone)]
pub struct CensusTrigger {
    tx: mpsc::UnboundedSender<()>,
}

impl CensusTrigger {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn fire(&self) {
        let _ = self.tx.send(());
    }
}

/// Run `job` once per burst of triggers, `delay` after the latest one.
/// Returns when every trigger handle is gone.
pub async fn debounce<F, Fut>(mut rx: mpsc::UnboundedReceiver<()>, delay: Duration, mut job: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    while rx.recv().await.is_some() {
        loop {
            match tokio::time::timeout(delay, rx.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => return,
                Err(_) => break,
            }
        }
        job().await;
    }
}

/// One enumerated web tab. `agent` is `None` for discarded or agentless tabs.
#[derive(Debug, Clone)]
pub struct CensusTarget {
    pub tab_id: TabId,
    pub active: bool,
    pub agent: Option<AgentHandle>,
}

/// Introduce every target concurrently; failures become "no report".
/// Output keeps the input order.
pub async fn gather(targets: Vec<CensusTarget>, timeout: Duration) -> Vec<CensusEntry> {
    join_all(targets.into_iter().map(|target| async move {
        let report = match &target.agent {
            Some(agent) => agent.introduce(timeout).await,
            None => None,
        };
        CensusEntry {
            tab_id: target.tab_id,
            active: target.active,
            report,
        }
    }))
    .await
}
