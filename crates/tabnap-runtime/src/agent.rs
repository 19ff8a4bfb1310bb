//! Per-tab agent: owns one tab's page facts and eligibility timer.
//!
//! An agent is a single task draining its mailbox and the preferences watch
//! in order, so its state needs no locking. Scheduled wake-ups are separate
//! sleep tasks that post back into the mailbox through a weak sender; when
//! the coordinator drops the last handle the agent stops and aborts them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use tabnap_core::exceptions::ExceptionResult;
use tabnap_core::timer::{self, ArmTicket, CheckRequest, EligibilityTimer, FireRequest, FireVerdict};
use tabnap_core::{EligibilityReport, Preferences, TabId};
use tabnap_host::{HostError, PowerSource};

use crate::clock::Clock;
use crate::probe;
use crate::protocol::{AgentMessage, CoordinatorLink};

/// Recheck delay after playback starts.
pub const MEDIA_START_RECHECK_MS: u64 = 0;
/// Recheck delay after playback stops.
pub const MEDIA_STOP_RECHECK_MS: u64 = 5_000;

/// What the page itself has told its agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageState {
    pub url: String,
    pub hidden: bool,
    /// The document finished loading.
    pub ready: bool,
    pub form_dirty: bool,
    pub notification_granted: bool,
    /// When this agent was created, epoch ms.
    pub loaded_at_ms: u64,
}

impl PageState {
    pub fn new(url: impl Into<String>, hidden: bool, ready: bool, loaded_at_ms: u64) -> Self {
        Self {
            url: url.into(),
            hidden,
            ready,
            form_dirty: false,
            notification_granted: false,
            loaded_at_ms,
        }
    }
}

/// Shared services every agent needs.
#[derive(Clone)]
pub struct AgentContext {
    pub prefs: watch::Receiver<Arc<Preferences>>,
    pub power: Arc<dyn PowerSource>,
    pub clock: Clock,
}

// ─── Handle ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AgentHandle {
    tab_id: TabId,
    tx: mpsc::UnboundedSender<AgentMessage>,
}

impl AgentHandle {
    /// Post a message. Returns false if the agent has stopped.
    pub fn send(&self, msg: AgentMessage) -> bool {
        let method = msg.method();
        let sent = self.tx.send(msg).is_ok();
        if !sent {
            tracing::debug!("tab {}: agent gone, dropped {method}", self.tab_id);
        }
        sent
    }

    /// `introduce` round-trip. `None` on timeout or when the agent could not
    /// answer.
    pub async fn introduce(&self, timeout: Duration) -> Option<EligibilityReport> {
        let (reply, rx) = oneshot::channel();
        if !self.send(AgentMessage::Introduce(reply)) {
            return None;
        }
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(report)) => Some(report),
            Ok(Err(_)) => None,
            Err(_) => {
                tracing::debug!("tab {}: introduce timed out", self.tab_id);
                None
            }
        }
    }

    /// Liveness probe.
    pub async fn ping(&self, timeout: Duration) -> bool {
        let (reply, rx) = oneshot::channel();
        if !self.send(AgentMessage::Ping(reply)) {
            return false;
        }
        matches!(tokio::time::timeout(timeout, rx).await, Ok(Ok(())))
    }
}

pub fn spawn_agent(link: CoordinatorLink, page: PageState, ctx: AgentContext) -> AgentHandle {
    let tab_id = link.tab_id();
    let (tx, rx) = mpsc::unbounded_channel();
    let mut prefs_rx = ctx.prefs;
    let prefs = Arc::clone(&prefs_rx.borrow_and_update());
    let agent = Agent {
        tab_id,
        page,
        allowed: true,
        timer: EligibilityTimer::new(),
        pending: None,
        recheck_seq: 0,
        recheck: None,
        prefs,
        prefs_rx,
        link,
        power: ctx.power,
        clock: ctx.clock,
        mailbox: tx.downgrade(),
    };
    tokio::spawn(agent.run(rx));
    AgentHandle { tab_id, tx }
}

// ─── Agent task ──────────────────────────────────────────────────

struct Agent {
    tab_id: TabId,
    page: PageState,
    /// Session-level opt-out; false blocks the final discard.
    allowed: bool,
    timer: EligibilityTimer,
    pending: Option<JoinHandle<()>>,
    recheck_seq: u64,
    recheck: Option<JoinHandle<()>>,
    prefs: Arc<Preferences>,
    prefs_rx: watch::Receiver<Arc<Preferences>>,
    link: CoordinatorLink,
    power: Arc<dyn PowerSource>,
    clock: Clock,
    mailbox: mpsc::WeakUnboundedSender<AgentMessage>,
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.cancel_pending();
        if let Some(task) = self.recheck.take() {
            task.abort();
        }
    }
}

impl Agent {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<AgentMessage>) {
        decision!(self.prefs.log, self.tab_id, "agent started for {}", self.page.url);
        if self.page.ready {
            self.check(CheckRequest::scheduled()).await;
        }

        let mut prefs_open = true;
        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(msg) => self.handle(msg).await,
                    None => break,
                },
                changed = self.prefs_rx.changed(), if prefs_open => match changed {
                    Ok(()) => self.on_prefs_changed().await,
                    Err(_) => prefs_open = false,
                },
            }
        }
        tracing::debug!("tab {}: agent stopped", self.tab_id);
    }

    async fn handle(&mut self, msg: AgentMessage) {
        match msg {
            AgentMessage::Visibility { hidden } => {
                self.page.hidden = hidden;
                self.check(CheckRequest::scheduled()).await;
            }
            AgentMessage::Loaded => {
                self.page.ready = true;
                self.check(CheckRequest::scheduled()).await;
            }
            AgentMessage::Idle => {
                if let Some(fire) = self.timer.on_idle(self.clock.now_ms()) {
                    self.cancel_pending();
                    decision!(
                        self.prefs.log,
                        self.tab_id,
                        "deadline passed while the host was idle"
                    );
                    self.fire(fire).await;
                }
            }
            AgentMessage::CanDiscard => self.check(CheckRequest::manual()).await,
            AgentMessage::BypassDiscard => self.check(CheckRequest::bypass()).await,
            AgentMessage::Introduce(reply) => self.introduce(reply).await,
            AgentMessage::Ping(reply) => {
                let _ = reply.send(());
            }
            AgentMessage::Form { dirty } => self.page.form_dirty = dirty,
            AgentMessage::Media { playing } => {
                let delay = if playing {
                    MEDIA_START_RECHECK_MS
                } else {
                    MEDIA_STOP_RECHECK_MS
                };
                self.schedule_recheck(delay);
            }
            AgentMessage::NotificationPermission { granted } => {
                self.page.notification_granted = granted;
            }
            AgentMessage::SetAllowed { allowed } => {
                self.allowed = allowed;
                decision!(
                    self.prefs.log,
                    self.tab_id,
                    "discarding allowed for this session: {allowed}"
                );
            }
            AgentMessage::TimerFired { token } => match self.timer.on_deadline(token) {
                Some(fire) => {
                    self.pending = None;
                    self.fire(fire).await;
                }
                None => tracing::trace!("tab {}: stale timer token {token}", self.tab_id),
            },
            AgentMessage::Recheck { seq } => {
                if seq == self.recheck_seq {
                    self.recheck = None;
                    self.check(CheckRequest::scheduled()).await;
                }
            }
        }
    }

    async fn on_prefs_changed(&mut self) {
        let next = Arc::clone(&self.prefs_rx.borrow_and_update());
        let delta = self.prefs.diff(&next);
        self.prefs = next;
        if delta.touches_schedule() {
            self.check(CheckRequest::scheduled()).await;
        }
    }

    async fn evaluate(&self) -> Result<ExceptionResult, HostError> {
        probe::evaluate_all(&self.prefs, &self.page, &self.link, &self.power).await
    }

    async fn check(&mut self, req: CheckRequest) {
        let delay_ms = match timer::gate(&self.prefs, req, self.page.hidden, &self.page.url) {
            Ok(delay) => delay,
            Err(reason) => {
                decision!(self.prefs.log, self.tab_id, "check skipped: {}", reason.as_str());
                return;
            }
        };

        let exceptions = match self.evaluate().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("tab {}: exception check failed: {e}", self.tab_id);
                return;
            }
        };

        if timer::clears_on_exception(exceptions.any(), req) {
            self.cancel_pending();
            if self.timer.clear() {
                decision!(self.prefs.log, self.tab_id, "timer cleared: {}", exceptions.describe());
            }
            return;
        }

        let ticket = self.timer.arm(self.clock.now_ms(), delay_ms, req.bypass);
        decision!(
            self.prefs.log,
            self.tab_id,
            "discard armed in {} ms{}",
            ticket.delay_ms,
            if req.bypass { " (bypass)" } else { "" }
        );
        self.schedule(ticket);
    }

    async fn fire(&mut self, fire: FireRequest) {
        let exceptions = match self.evaluate().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("tab {}: exception check failed: {e}", self.tab_id);
                self.timer.finish();
                return;
            }
        };

        match timer::fire_verdict(exceptions.any(), fire.bypass, self.allowed) {
            FireVerdict::Discard => {
                decision!(self.prefs.log, self.tab_id, "requesting discard");
                self.link.discard();
            }
            FireVerdict::SkipException => {
                decision!(
                    self.prefs.log,
                    self.tab_id,
                    "double-check before discarding: {}",
                    exceptions.describe()
                );
            }
            FireVerdict::SkipNotAllowed => {
                decision!(
                    self.prefs.log,
                    self.tab_id,
                    "discard skipped: not allowed in this session"
                );
            }
        }
        self.timer.finish();
    }

    async fn introduce(&self, reply: oneshot::Sender<EligibilityReport>) {
        match self.evaluate().await {
            Ok(exceptions) => {
                let _ = reply.send(EligibilityReport {
                    exception: exceptions.any(),
                    ready: self.page.ready,
                    now: self.page.loaded_at_ms,
                });
            }
            Err(e) => {
                tracing::warn!("tab {}: cannot introduce: {e}", self.tab_id);
            }
        }
    }

    fn schedule(&mut self, ticket: ArmTicket) {
        self.cancel_pending();
        let mailbox = self.mailbox.clone();
        let token = ticket.token;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ticket.delay_ms)).await;
            if let Some(tx) = mailbox.upgrade() {
                let _ = tx.send(AgentMessage::TimerFired { token });
            }
        }));
    }

    fn schedule_recheck(&mut self, delay_ms: u64) {
        if let Some(task) = self.recheck.take() {
            task.abort();
        }
        self.recheck_seq += 1;
        let seq = self.recheck_seq;
        let mailbox = self.mailbox.clone();
        self.recheck = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            if let Some(tx) = mailbox.upgrade() {
                let _ = tx.send(AgentMessage::Recheck { seq });
            }
        }));
    }

    fn cancel_pending(&mut self) {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
    }
}
