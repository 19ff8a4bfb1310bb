//! Message vocabulary between the bridge, the coordinator and tab agents.
//!
//! Bridge events arrive as JSON-RPC notifications (`method` + `params`).
//! Agent traffic never leaves the process: it travels over tokio channels,
//! with `oneshot` senders standing in for response callbacks.

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use tabnap_core::types::IdleState;
use tabnap_core::{EligibilityReport, TabId, TabSnapshot, TabUpdate};

// ─── Bridge → coordinator ────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum BrowserEvent {
    TabCreated { tab: TabSnapshot },
    TabUpdated(TabUpdate),
    TabActivated { tab_id: TabId },
    TabRemoved { tab_id: TabId },
    IdleState { state: IdleState },
    VisibilityChanged { tab_id: TabId, hidden: bool },
    FormChanged { tab_id: TabId, dirty: bool },
    MediaChanged { tab_id: TabId, playing: bool },
    NotificationPermission { tab_id: TabId, granted: bool },
    SetAllowed { tab_id: TabId, allowed: bool },
    CanDiscard { tab_id: TabId },
    BypassDiscard { tab_id: TabId },
}

impl BrowserEvent {
    pub const METHODS: [&'static str; 12] = [
        "tab_created",
        "tab_updated",
        "tab_activated",
        "tab_removed",
        "idle_state",
        "visibility_changed",
        "form_changed",
        "media_changed",
        "notification_permission",
        "set_allowed",
        "can_discard",
        "bypass_discard",
    ];

    pub fn is_event_method(method: &str) -> bool {
        Self::METHODS.contains(&method)
    }

    /// Decode a JSON-RPC notification body.
    pub fn from_rpc(method: &str, params: &serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(serde_json::json!({
            "method": method,
            "params": params,
        }))
    }
}

// ─── Coordinator → agent ─────────────────────────────────────────

#[derive(Debug)]
pub enum AgentMessage {
    /// Page visibility changed.
    Visibility { hidden: bool },
    /// The document finished loading.
    Loaded,
    /// The host returned to the active idle state.
    Idle,
    CanDiscard,
    BypassDiscard,
    Introduce(oneshot::Sender<EligibilityReport>),
    Ping(oneshot::Sender<()>),
    Form { dirty: bool },
    Media { playing: bool },
    NotificationPermission { granted: bool },
    SetAllowed { allowed: bool },
    /// Internal: a scheduled deadline elapsed.
    TimerFired { token: u64 },
    /// Internal: a debounced media recheck elapsed.
    Recheck { seq: u64 },
}

impl AgentMessage {
    pub fn method(&self) -> &'static str {
        match self {
            Self::Visibility { .. } => "visibility",
            Self::Loaded => "loaded",
            Self::Idle => "idle",
            Self::CanDiscard => "can-discard",
            Self::BypassDiscard => "bypass-discard",
            Self::Introduce(_) => "introduce",
            Self::Ping(_) => "ping",
            Self::Form { .. } => "form",
            Self::Media { .. } => "media",
            Self::NotificationPermission { .. } => "notification-permission",
            Self::SetAllowed { .. } => "set-allowed",
            Self::TimerFired { .. } => "timer-fired",
            Self::Recheck { .. } => "recheck",
        }
    }
}

// ─── Agent → coordinator ─────────────────────────────────────────

#[derive(Debug)]
pub enum AgentRequest {
    IsPinned(oneshot::Sender<bool>),
    IsPlaying(oneshot::Sender<bool>),
    Discard,
}

impl AgentRequest {
    pub fn method(&self) -> &'static str {
        match self {
            Self::IsPinned(_) => "is-pinned",
            Self::IsPlaying(_) => "is-playing",
            Self::Discard => "discard",
        }
    }
}

#[derive(Debug)]
pub struct AgentEnvelope {
    pub tab_id: TabId,
    pub request: AgentRequest,
}

/// An agent's channel back to the coordinator, bound to its tab.
#[derive(Debug, Clone)]
pub struct CoordinatorLink {
    tab_id: TabId,
    tx: mpsc::UnboundedSender<AgentEnvelope>,
}

impl CoordinatorLink {
    pub fn new(tab_id: TabId, tx: mpsc::UnboundedSender<AgentEnvelope>) -> Self {
        Self { tab_id, tx }
    }

    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    fn send(&self, request: AgentRequest) -> bool {
        let method = request.method();
        let sent = self
            .tx
            .send(AgentEnvelope {
                tab_id: self.tab_id,
                request,
            })
            .is_ok();
        if !sent {
            tracing::debug!("tab {}: coordinator gone, dropped {method}", self.tab_id);
        }
        sent
    }

    async fn ask(&self, make: fn(oneshot::Sender<bool>) -> AgentRequest) -> bool {
        let (reply, rx) = oneshot::channel();
        if !self.send(make(reply)) {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn is_pinned(&self) -> bool {
        self.ask(AgentRequest::IsPinned).await
    }

    pub async fn is_playing(&self) -> bool {
        self.ask(AgentRequest::IsPlaying).await
    }

    pub fn discard(&self) -> bool {
        self.send(AgentRequest::Discard)
    }
}
