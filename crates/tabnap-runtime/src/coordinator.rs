//! Coordinator: owns the tab registry and the agents, performs discards.
//!
//! Bridge events arrive through [`Coordinator::handle_event`]. Agent requests
//! are served by a dedicated task so that an agent waiting on `is-playing`
//! never queues behind a census fan-out. The state lock is never held across
//! an agent round-trip.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, mpsc};

use tabnap_core::census::{self, CensusOutcome, MIN_OPEN_TABS};
use tabnap_core::restore::RestoreCache;
use tabnap_core::types::IdleState;
use tabnap_core::{DiscardMode, TabId, TabSnapshot, TabStatus, TabUpdate};
use tabnap_host::{BrowserHost, PowerSource, TabRegistry};

use crate::agent::{self, AgentContext, AgentHandle, PageState};
use crate::census::{CensusTarget, CensusTrigger, DEFAULT_DEBOUNCE_MS, DEFAULT_INTRODUCE_TIMEOUT_MS};
use crate::clock::Clock;
use crate::prefs_store::PrefsStore;
use crate::protocol::{AgentEnvelope, AgentMessage, AgentRequest, BrowserEvent, CoordinatorLink};

pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 1_500;

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub census_debounce: Duration,
    pub introduce_timeout: Duration,
    /// Verify reactivated tabs and force a reload when they stay blank.
    pub restore_probe: bool,
    pub probe_timeout: Duration,
    /// Time source for load stamps and timer deadlines.
    pub clock: Clock,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            census_debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            introduce_timeout: Duration::from_millis(DEFAULT_INTRODUCE_TIMEOUT_MS),
            restore_probe: false,
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            clock: Clock::wall(),
        }
    }
}

// ─── State ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiscardStats {
    pub discarded: u64,
    /// Requests refused because the tab was active.
    pub refused: u64,
    /// Reactivated tabs that answered the restore probe.
    pub restored: u64,
    /// Reactivated tabs that needed a forced reload.
    pub reloaded: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CensusRecord {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: CensusOutcome,
}

#[derive(Debug)]
pub struct CoordinatorState {
    pub registry: TabRegistry,
    pub agents: HashMap<TabId, AgentHandle>,
    pub restore: RestoreCache,
    pub stats: DiscardStats,
    pub last_census: Option<CensusRecord>,
    pub started_at: DateTime<Utc>,
}

impl CoordinatorState {
    fn new() -> Self {
        Self {
            registry: TabRegistry::new(),
            agents: HashMap::new(),
            restore: RestoreCache::new(),
            stats: DiscardStats::default(),
            last_census: None,
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TabView {
    #[serde(flatten)]
    pub tab: TabSnapshot,
    pub has_agent: bool,
    pub restore_pending: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub started_at: DateTime<Utc>,
    pub mode: DiscardMode,
    pub period: u64,
    pub number: usize,
    pub tabs: usize,
    pub web_tabs: usize,
    pub discarded: usize,
    pub agents: usize,
    pub restore_pending: usize,
    pub stats: DiscardStats,
    pub last_census: Option<CensusRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardOutcome {
    Discarded,
    RefusedActive,
    AlreadyDiscarded,
    UnknownTab,
    HostFailed,
}

// ─── Coordinator ─────────────────────────────────────────────────

struct Inner<H> {
    state: Mutex<CoordinatorState>,
    host: Arc<H>,
    prefs: PrefsStore,
    power: Arc<dyn PowerSource>,
    settings: CoordinatorSettings,
    requests: mpsc::UnboundedSender<AgentEnvelope>,
    census: CensusTrigger,
}

pub struct Coordinator<H> {
    inner: Arc<Inner<H>>,
}

impl<H> Clone for Coordinator<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: BrowserHost + 'static> Coordinator<H> {
    /// Build the coordinator and spawn its request loop and census debouncer.
    pub fn start(
        host: Arc<H>,
        prefs: PrefsStore,
        power: Arc<dyn PowerSource>,
        settings: CoordinatorSettings,
    ) -> Self {
        let (requests, request_rx) = mpsc::unbounded_channel();
        let (census, census_rx) = CensusTrigger::channel();
        let debounce = settings.census_debounce;
        let coordinator = Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CoordinatorState::new()),
                host,
                prefs,
                power,
                settings,
                requests,
                census,
            }),
        };

        let this = coordinator.clone();
        tokio::spawn(async move { this.serve_requests(request_rx).await });

        let this = coordinator.clone();
        tokio::spawn(crate::census::debounce(census_rx, debounce, move || {
            let this = this.clone();
            async move { this.scheduled_census().await }
        }));

        coordinator
    }

    pub fn host(&self) -> &Arc<H> {
        &self.inner.host
    }

    pub fn prefs(&self) -> &PrefsStore {
        &self.inner.prefs
    }

    // ─── Bridge events ───────────────────────────────────────────

    pub async fn handle_event(&self, event: BrowserEvent) -> anyhow::Result<()> {
        match event {
            BrowserEvent::TabCreated { tab } => self.on_tab_created(tab).await,
            BrowserEvent::TabUpdated(update) => self.on_tab_updated(update).await,
            BrowserEvent::TabActivated { tab_id } => self.on_tab_activated(tab_id).await,
            BrowserEvent::TabRemoved { tab_id } => self.on_tab_removed(tab_id).await,
            BrowserEvent::IdleState { state } => {
                if state == IdleState::Active {
                    self.broadcast_idle().await;
                }
            }
            BrowserEvent::VisibilityChanged { tab_id, hidden } => {
                self.forward(tab_id, AgentMessage::Visibility { hidden }).await?;
            }
            BrowserEvent::FormChanged { tab_id, dirty } => {
                self.forward(tab_id, AgentMessage::Form { dirty }).await?;
            }
            BrowserEvent::MediaChanged { tab_id, playing } => {
                self.forward(tab_id, AgentMessage::Media { playing }).await?;
            }
            BrowserEvent::NotificationPermission { tab_id, granted } => {
                self.forward(tab_id, AgentMessage::NotificationPermission { granted })
                    .await?;
            }
            BrowserEvent::SetAllowed { tab_id, allowed } => {
                self.forward(tab_id, AgentMessage::SetAllowed { allowed }).await?;
            }
            BrowserEvent::CanDiscard { tab_id } => {
                self.forward(tab_id, AgentMessage::CanDiscard).await?;
            }
            BrowserEvent::BypassDiscard { tab_id } => {
                self.forward(tab_id, AgentMessage::BypassDiscard).await?;
            }
        }
        Ok(())
    }

    async fn on_tab_created(&self, tab: TabSnapshot) {
        let mut st = self.inner.state.lock().await;
        let ready = tab.status == TabStatus::Complete;
        let previous = st.registry.upsert(tab.clone());
        if let Some(prev) = previous
            && let Some(agent) = st.agents.get(&prev)
        {
            agent.send(AgentMessage::Visibility { hidden: true });
        }
        if tab.is_web() && !tab.discarded {
            self.spawn_agent_locked(&mut st, &tab, ready);
        }
        drop(st);
        tracing::debug!("tab {} created: {}", tab.tab_id, tab.url);
        self.inner.census.fire();
    }

    async fn on_tab_updated(&self, update: TabUpdate) {
        let mut st = self.inner.state.lock().await;
        let Some(tab) = st.registry.apply(&update).cloned() else {
            tracing::debug!("update for unknown tab {}", update.tab_id);
            return;
        };

        if tab.discarded || !tab.is_web() {
            st.agents.remove(&tab.tab_id);
            return;
        }

        let complete = update.is_load_complete();
        if update.is_navigation() || update.is_undiscard() || !st.agents.contains_key(&tab.tab_id)
        {
            // a fresh document gets a fresh agent
            self.spawn_agent_locked(&mut st, &tab, complete);
        } else if complete && let Some(agent) = st.agents.get(&tab.tab_id) {
            agent.send(AgentMessage::Loaded);
        }
        drop(st);

        if complete {
            self.inner.census.fire();
        }
    }

    async fn on_tab_activated(&self, tab_id: TabId) {
        let mut st = self.inner.state.lock().await;
        let activation = st.registry.activate(tab_id);
        if !activation.known {
            tracing::debug!("activation of unknown tab {tab_id}");
            return;
        }
        if let Some(prev) = activation.previous
            && let Some(agent) = st.agents.get(&prev)
        {
            agent.send(AgentMessage::Visibility { hidden: true });
        }
        if let Some(agent) = st.agents.get(&tab_id) {
            agent.send(AgentMessage::Visibility { hidden: false });
        }
        let restore_url = st.restore.take(tab_id);
        drop(st);

        if let Some(url) = restore_url {
            self.spawn_restore_probe(tab_id, url);
        }
    }

    async fn on_tab_removed(&self, tab_id: TabId) {
        let mut st = self.inner.state.lock().await;
        st.registry.remove(tab_id);
        st.agents.remove(&tab_id);
        st.restore.forget(tab_id);
        tracing::debug!("tab {tab_id} removed");
    }

    async fn broadcast_idle(&self) {
        let st = self.inner.state.lock().await;
        for tab in st.registry.web_tabs(false) {
            if let Some(agent) = st.agents.get(&tab.tab_id) {
                agent.send(AgentMessage::Idle);
            }
        }
    }

    async fn forward(&self, tab_id: TabId, msg: AgentMessage) -> anyhow::Result<()> {
        let st = self.inner.state.lock().await;
        let Some(agent) = st.agents.get(&tab_id) else {
            anyhow::bail!("no agent for tab {tab_id}");
        };
        if !agent.send(msg) {
            anyhow::bail!("agent for tab {tab_id} has stopped");
        }
        Ok(())
    }

    fn spawn_agent_locked(&self, st: &mut CoordinatorState, tab: &TabSnapshot, ready: bool) {
        let link = CoordinatorLink::new(tab.tab_id, self.inner.requests.clone());
        let clock = self.inner.settings.clock.clone();
        let page = PageState::new(&tab.url, !tab.active, ready, clock.now_ms());
        let ctx = AgentContext {
            prefs: self.inner.prefs.subscribe(),
            power: Arc::clone(&self.inner.power),
            clock,
        };
        st.agents
            .insert(tab.tab_id, agent::spawn_agent(link, page, ctx));
    }

    // ─── Agent requests ──────────────────────────────────────────

    async fn serve_requests(&self, mut rx: mpsc::UnboundedReceiver<AgentEnvelope>) {
        while let Some(AgentEnvelope { tab_id, request }) = rx.recv().await {
            match request {
                AgentRequest::IsPinned(reply) => {
                    let st = self.inner.state.lock().await;
                    let _ = reply.send(st.registry.get(tab_id).is_some_and(|t| t.pinned));
                }
                AgentRequest::IsPlaying(reply) => {
                    let st = self.inner.state.lock().await;
                    let _ = reply.send(st.registry.get(tab_id).is_some_and(|t| t.audible));
                }
                AgentRequest::Discard => {
                    self.discard_tab(tab_id).await;
                }
            }
        }
    }

    /// Physically discard `tab_id` unless it is active, unknown or already
    /// discarded.
    pub async fn discard_tab(&self, tab_id: TabId) -> DiscardOutcome {
        let mut st = self.inner.state.lock().await;
        let Some(tab) = st.registry.get(tab_id).cloned() else {
            tracing::debug!("discard of unknown tab {tab_id} ignored");
            return DiscardOutcome::UnknownTab;
        };
        if tab.active {
            st.stats.refused += 1;
            tracing::info!("refusing to discard active tab {tab_id}");
            return DiscardOutcome::RefusedActive;
        }
        if tab.discarded {
            return DiscardOutcome::AlreadyDiscarded;
        }
        if let Err(e) = self.inner.host.discard(tab_id) {
            tracing::warn!("failed to discard tab {tab_id}: {e}");
            return DiscardOutcome::HostFailed;
        }

        st.registry.set_discarded(tab_id, true);
        st.agents.remove(&tab_id);
        if self.inner.settings.restore_probe {
            st.restore.record(tab_id, tab.url.clone());
        }
        st.stats.discarded += 1;
        tracing::info!("discarded tab {tab_id} ({})", tab.url);
        DiscardOutcome::Discarded
    }

    fn spawn_restore_probe(&self, tab_id: TabId, url: String) {
        let this = self.clone();
        tokio::spawn(async move { this.restore_probe(tab_id, url).await });
    }

    async fn restore_probe(&self, tab_id: TabId, url: String) {
        let timeout = self.inner.settings.probe_timeout;
        tokio::time::sleep(timeout).await;

        let agent = {
            let st = self.inner.state.lock().await;
            if st.registry.get(tab_id).is_none() {
                return;
            }
            st.agents.get(&tab_id).cloned()
        };
        let alive = match agent {
            Some(agent) => agent.ping(timeout).await,
            None => false,
        };

        let mut st = self.inner.state.lock().await;
        if alive {
            st.stats.restored += 1;
            tracing::debug!("tab {tab_id} came back after discard");
            return;
        }
        match self.inner.host.navigate(tab_id, &url) {
            Ok(()) => {
                st.stats.reloaded += 1;
                tracing::warn!("tab {tab_id} stayed blank after reactivation, reloading {url}");
            }
            Err(e) => tracing::warn!("failed to reload tab {tab_id}: {e}"),
        }
    }

    // ─── Census ──────────────────────────────────────────────────

    async fn scheduled_census(&self) {
        let mode = self.inner.prefs.current().mode;
        if mode != DiscardMode::NumberBased {
            tracing::trace!("census skipped in {mode} mode");
            return;
        }
        self.run_census().await;
    }

    /// Introduce every web tab and force-discard the oldest excess.
    pub async fn run_census(&self) -> CensusOutcome {
        let ceiling = self.inner.prefs.current().number;
        let targets: Vec<CensusTarget> = {
            let st = self.inner.state.lock().await;
            st.registry
                .web_tabs(true)
                .into_iter()
                .map(|tab| CensusTarget {
                    tab_id: tab.tab_id,
                    active: tab.active,
                    agent: if tab.discarded {
                        None
                    } else {
                        st.agents.get(&tab.tab_id).cloned()
                    },
                })
                .collect()
        };

        let outcome = if targets.len() < MIN_OPEN_TABS {
            CensusOutcome {
                open: targets.len(),
                ..Default::default()
            }
        } else {
            let entries =
                crate::census::gather(targets, self.inner.settings.introduce_timeout).await;
            census::evaluate(&entries, ceiling)
        };

        let mut st = self.inner.state.lock().await;
        for tab_id in &outcome.candidates {
            if let Some(agent) = st.agents.get(tab_id) {
                agent.send(AgentMessage::BypassDiscard);
            }
        }
        if outcome.candidates.is_empty() {
            tracing::debug!(
                "census: {} open, {} eligible, nothing to discard",
                outcome.open,
                outcome.eligible
            );
        } else {
            tracing::info!(
                "census: {} open, {} eligible, discarding {} over the limit of {ceiling}",
                outcome.open,
                outcome.eligible,
                outcome.candidates.len()
            );
        }
        st.last_census = Some(CensusRecord {
            at: Utc::now(),
            outcome: outcome.clone(),
        });
        outcome
    }

    // ─── Queries ─────────────────────────────────────────────────

    pub async fn list_tabs(&self) -> Vec<TabView> {
        let st = self.inner.state.lock().await;
        st.registry
            .list()
            .into_iter()
            .map(|tab| TabView {
                has_agent: st.agents.contains_key(&tab.tab_id),
                restore_pending: st.restore.contains(tab.tab_id),
                tab,
            })
            .collect()
    }

    pub async fn status(&self) -> StatusReport {
        let prefs = self.inner.prefs.current();
        let st = self.inner.state.lock().await;
        StatusReport {
            started_at: st.started_at,
            mode: prefs.mode,
            period: prefs.period,
            number: prefs.number,
            tabs: st.registry.len(),
            web_tabs: st.registry.web_tabs(true).len(),
            discarded: st.registry.discarded_count(),
            agents: st.agents.len(),
            restore_pending: st.restore.len(),
            stats: st.stats,
            last_census: st.last_census.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tabnap_core::Preferences;
    use tabnap_host::{CommandQueue, HostCommand, HostError};

    struct OnBattery;

    impl PowerSource for OnBattery {
        fn on_external_power(&self) -> Result<bool, HostError> {
            Ok(false)
        }
    }

    fn start(prefs: Preferences, settings: CoordinatorSettings) -> Coordinator<CommandQueue> {
        Coordinator::start(
            Arc::new(CommandQueue::new()),
            PrefsStore::new(prefs),
            Arc::new(OnBattery),
            settings,
        )
    }

    /// Defaults with a clock that follows tokio time.
    fn settings() -> CoordinatorSettings {
        CoordinatorSettings {
            clock: Clock::starting_at(1_000_000),
            ..CoordinatorSettings::default()
        }
    }

    fn time_based(period: u64) -> Preferences {
        Preferences {
            period,
            audio: true,
            form: true,
            ..Default::default()
        }
    }

    fn web_tab(id: u64, index: u32, active: bool) -> TabSnapshot {
        TabSnapshot {
            tab_id: TabId(id),
            window_id: 1,
            index,
            url: format!("https://site{id}.test/"),
            title: format!("site {id}"),
            active,
            status: TabStatus::Complete,
            ..Default::default()
        }
    }

    async fn create(c: &Coordinator<CommandQueue>, tab: TabSnapshot) {
        c.handle_event(BrowserEvent::TabCreated { tab })
            .await
            .expect("tab_created");
    }

    fn discards(c: &Coordinator<CommandQueue>) -> Vec<TabId> {
        c.host()
            .pull(0, 100)
            .commands
            .into_iter()
            .filter_map(|cmd| match cmd.command {
                HostCommand::Discard { tab_id } => Some(tab_id),
                HostCommand::Navigate { .. } => None,
            })
            .collect()
    }

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_tab_is_discarded_after_period() {
        let c = start(time_based(10), settings());
        create(&c, web_tab(1, 0, true)).await;
        create(&c, web_tab(2, 1, false)).await;

        sleep_ms(9_900).await;
        assert!(discards(&c).is_empty());
        sleep_ms(200).await;
        assert_eq!(discards(&c), vec![TabId(2)]);

        let tabs = c.list_tabs().await;
        let tab2 = tabs.iter().find(|t| t.tab.tab_id == TabId(2)).expect("tab 2");
        assert!(tab2.tab.discarded);
        assert!(!tab2.has_agent);
        assert_eq!(c.status().await.stats.discarded, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn audible_tab_waits_for_playback_to_stop() {
        let c = start(time_based(10), settings());
        create(&c, web_tab(1, 0, true)).await;
        create(
            &c,
            TabSnapshot {
                audible: true,
                ..web_tab(2, 1, false)
            },
        )
        .await;

        sleep_ms(60_000).await;
        assert!(discards(&c).is_empty());

        c.handle_event(BrowserEvent::TabUpdated(TabUpdate {
            tab_id: TabId(2),
            audible: Some(false),
            ..Default::default()
        }))
        .await
        .expect("tab_updated");
        c.handle_event(BrowserEvent::MediaChanged {
            tab_id: TabId(2),
            playing: false,
        })
        .await
        .expect("media_changed");

        // 5 s recheck delay, then the full period
        sleep_ms(14_900).await;
        assert!(discards(&c).is_empty());
        sleep_ms(200).await;
        assert_eq!(discards(&c), vec![TabId(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_pushes_the_deadline() {
        let c = start(time_based(10), settings());
        create(&c, web_tab(1, 0, true)).await;
        create(&c, web_tab(2, 1, false)).await;

        sleep_ms(5_000).await;
        c.handle_event(BrowserEvent::VisibilityChanged {
            tab_id: TabId(2),
            hidden: true,
        })
        .await
        .expect("visibility_changed");

        sleep_ms(7_000).await;
        assert!(discards(&c).is_empty(), "first deadline superseded");
        sleep_ms(3_100).await;
        assert_eq!(discards(&c), vec![TabId(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn active_tab_is_never_discarded() {
        let c = start(time_based(10), settings());
        create(&c, web_tab(1, 0, true)).await;
        create(&c, web_tab(2, 1, false)).await;

        // tab 2 is armed; focusing it does not clear the timer
        sleep_ms(5_000).await;
        c.handle_event(BrowserEvent::TabActivated { tab_id: TabId(2) })
            .await
            .expect("tab_activated");

        // the displaced tab 1 becomes hidden and goes instead
        sleep_ms(60_000).await;
        assert_eq!(discards(&c), vec![TabId(1)]);
        assert_eq!(c.status().await.stats.refused, 1);
        assert_eq!(c.discard_tab(TabId(2)).await, DiscardOutcome::RefusedActive);
        assert_eq!(c.discard_tab(TabId(99)).await, DiscardOutcome::UnknownTab);
    }

    #[tokio::test(start_paused = true)]
    async fn census_discards_the_oldest_excess() {
        let prefs = Preferences {
            mode: DiscardMode::NumberBased,
            number: 3,
            ..Default::default()
        };
        let c = start(prefs, settings());
        create(&c, web_tab(10, 0, true)).await;
        for id in 1..=5 {
            sleep_ms(100).await;
            create(&c, web_tab(id, id as u32, false)).await;
        }

        sleep_ms(700).await;
        let got: HashSet<TabId> = discards(&c).into_iter().collect();
        assert_eq!(got, HashSet::from([TabId(1), TabId(2)]));

        let census = c.status().await.last_census.expect("census ran");
        assert_eq!(census.outcome.open, 6);
        assert_eq!(census.outcome.eligible, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn census_ignores_small_windows() {
        let prefs = Preferences {
            mode: DiscardMode::NumberBased,
            number: 1,
            ..Default::default()
        };
        let c = start(prefs, settings());
        create(&c, web_tab(1, 0, true)).await;
        create(&c, web_tab(2, 1, false)).await;
        create(&c, web_tab(3, 2, false)).await;

        sleep_ms(5_000).await;
        assert!(discards(&c).is_empty());
        let outcome = c.run_census().await;
        assert_eq!(outcome.open, 3);
        assert!(outcome.candidates.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn census_only_runs_in_number_mode() {
        let prefs = Preferences {
            period: 0,
            number: 1,
            ..Default::default()
        };
        let c = start(prefs, settings());
        for id in 1..=6 {
            create(&c, web_tab(id, id as u32, id == 1)).await;
        }
        sleep_ms(5_000).await;
        assert!(discards(&c).is_empty());
        assert!(c.status().await.last_census.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn whitelisted_host_is_kept() {
        let prefs = Preferences {
            whitelist: vec!["site2.test".into()],
            ..time_based(10)
        };
        let c = start(prefs, settings());
        create(&c, web_tab(1, 0, true)).await;
        create(&c, web_tab(2, 1, false)).await;
        create(&c, web_tab(3, 2, false)).await;

        sleep_ms(11_000).await;
        assert_eq!(discards(&c), vec![TabId(3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn url_based_mode_only_discards_listed_hosts() {
        let prefs = Preferences {
            mode: DiscardMode::UrlBased,
            whitelist_url: vec!["site2.test".into()],
            ..time_based(10)
        };
        let c = start(prefs, settings());
        create(&c, web_tab(1, 0, true)).await;
        create(&c, web_tab(2, 1, false)).await;
        create(&c, web_tab(3, 2, false)).await;

        sleep_ms(11_000).await;
        assert_eq!(discards(&c), vec![TabId(2)]);
        sleep_ms(60_000).await;
        assert_eq!(discards(&c), vec![TabId(2)], "unlisted tab is never armed");
    }

    #[tokio::test(start_paused = true)]
    async fn idle_broadcast_fires_deadlines_passed_during_suspend() {
        let settings = settings();
        let clock = settings.clock.clone();
        let c = start(time_based(10), settings);
        create(&c, web_tab(1, 0, true)).await;
        create(&c, web_tab(2, 1, false)).await;
        sleep_ms(1_000).await;

        c.handle_event(BrowserEvent::IdleState {
            state: IdleState::Active,
        })
        .await
        .expect("idle_state");
        sleep_ms(100).await;
        assert!(discards(&c).is_empty(), "deadline not reached yet");

        // host slept through the deadline; tokio time is still at ~1.1 s
        clock.skip_wall(10_000);
        c.handle_event(BrowserEvent::IdleState {
            state: IdleState::Active,
        })
        .await
        .expect("idle_state");
        sleep_ms(100).await;
        assert_eq!(discards(&c), vec![TabId(2)]);

        sleep_ms(20_000).await;
        assert_eq!(discards(&c), vec![TabId(2)], "scheduled wake-up was cancelled");
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_agent_is_an_error() {
        let c = start(time_based(10), settings());
        create(&c, web_tab(1, 0, true)).await;
        c.handle_event(BrowserEvent::TabRemoved { tab_id: TabId(1) })
            .await
            .expect("tab_removed");
        let err = c
            .handle_event(BrowserEvent::CanDiscard { tab_id: TabId(1) })
            .await
            .expect_err("no agent");
        assert!(err.to_string().contains("no agent"));
        assert!(c.list_tabs().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn restore_probe_reloads_a_silent_tab() {
        let settings = CoordinatorSettings {
            restore_probe: true,
            ..settings()
        };
        let c = start(time_based(10), settings);
        create(&c, web_tab(1, 0, true)).await;
        create(&c, web_tab(2, 1, false)).await;
        sleep_ms(10_100).await;
        assert_eq!(discards(&c), vec![TabId(2)]);
        assert_eq!(c.status().await.restore_pending, 1);

        c.handle_event(BrowserEvent::TabActivated { tab_id: TabId(2) })
            .await
            .expect("tab_activated");
        sleep_ms(1_600).await;

        let batch = c.host().pull(0, 100);
        assert!(batch.commands.iter().any(|cmd| cmd.command
            == HostCommand::Navigate {
                tab_id: TabId(2),
                url: "https://site2.test/".into(),
            }));
        let status = c.status().await;
        assert_eq!(status.stats.reloaded, 1);
        assert_eq!(status.restore_pending, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn restore_probe_accepts_a_live_tab() {
        let settings = CoordinatorSettings {
            restore_probe: true,
            ..settings()
        };
        let c = start(time_based(10), settings);
        create(&c, web_tab(1, 0, true)).await;
        create(&c, web_tab(2, 1, false)).await;
        sleep_ms(10_100).await;

        c.handle_event(BrowserEvent::TabActivated { tab_id: TabId(2) })
            .await
            .expect("tab_activated");
        c.handle_event(BrowserEvent::TabUpdated(TabUpdate {
            tab_id: TabId(2),
            discarded: Some(false),
            status: Some(TabStatus::Loading),
            ..Default::default()
        }))
        .await
        .expect("tab_updated");
        sleep_ms(2_000).await;

        let status = c.status().await;
        assert_eq!(status.stats.restored, 1);
        assert_eq!(status.stats.reloaded, 0);
        assert_eq!(c.host().recorded(), 1, "only the discard");
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_replaces_the_agent() {
        let c = start(time_based(10), settings());
        create(&c, web_tab(1, 0, true)).await;
        create(&c, web_tab(2, 1, false)).await;

        sleep_ms(8_000).await;
        c.handle_event(BrowserEvent::TabUpdated(TabUpdate {
            tab_id: TabId(2),
            status: Some(TabStatus::Loading),
            url: Some("https://other.test/".into()),
            ..Default::default()
        }))
        .await
        .expect("navigation");
        sleep_ms(5_000).await;
        assert!(discards(&c).is_empty(), "old deadline died with the old agent");

        c.handle_event(BrowserEvent::TabUpdated(TabUpdate {
            tab_id: TabId(2),
            status: Some(TabStatus::Complete),
            ..Default::default()
        }))
        .await
        .expect("load complete");
        sleep_ms(10_100).await;
        assert_eq!(discards(&c), vec![TabId(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn non_web_tabs_get_no_agent() {
        let c = start(time_based(1), settings());
        create(
            &c,
            TabSnapshot {
                url: "chrome://settings".into(),
                ..web_tab(1, 0, false)
            },
        )
        .await;
        sleep_ms(5_000).await;
        assert!(discards(&c).is_empty());
        let tabs = c.list_tabs().await;
        assert_eq!(tabs.len(), 1);
        assert!(!tabs[0].has_agent);
    }
}
