//! Per-tab eligibility timer state machine.
//!
//! - **Idle → Armed**: a check passed gating and no exception holds (or the
//!   request bypasses exceptions). Arming always supersedes the previous
//!   deadline: latest request wins.
//! - **Armed → Idle**: an exception holds at check time (non-bypass only).
//! - **Armed → Firing**: the scheduled callback for the current token
//!   arrives, or an idle broadcast arrives after the deadline has passed.
//! - **Firing → Idle**: after the final decision, whatever it was.
//!
//! Every arm/clear/fire bumps a monotonically increasing token. A scheduled
//! callback carries the token it was armed with; callbacks with an older token
//! are stale and ignored. Time is passed in as epoch milliseconds.

use serde::{Deserialize, Serialize};

use crate::prefs::{DiscardMode, Preferences};
use crate::whitelist;

/// Delay used by manual and bypassed requests.
pub const MANUAL_DELAY_MS: u64 = 1;

// ─── Check gating ────────────────────────────────────────────────

/// What asked the agent to evaluate its tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckRequest {
    /// Overrides `period` when set.
    pub delay_ms: Option<u64>,
    /// Explicit request: runs even when `period` is 0.
    pub manual: bool,
    /// Forced by the census: ignores mode gating and exceptions.
    pub bypass: bool,
}

impl CheckRequest {
    /// Visibility, load, preference and media triggers.
    pub const fn scheduled() -> Self {
        Self {
            delay_ms: None,
            manual: false,
            bypass: false,
        }
    }

    /// External `can-discard`.
    pub const fn manual() -> Self {
        Self {
            delay_ms: Some(MANUAL_DELAY_MS),
            manual: true,
            bypass: false,
        }
    }

    /// Census `bypass-discard`.
    pub const fn bypass() -> Self {
        Self {
            delay_ms: Some(MANUAL_DELAY_MS),
            manual: true,
            bypass: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NumberMode,
    UrlNotListed,
    Visible,
    NoPeriod,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NumberMode => "number-based discarding",
            Self::UrlNotListed => "url is not in the list",
            Self::Visible => "tab is visible",
            Self::NoPeriod => "discard period is disabled",
        }
    }
}

/// Decide whether a check may proceed; returns the delay to arm with.
pub fn gate(
    prefs: &Preferences,
    req: CheckRequest,
    hidden: bool,
    url: &str,
) -> Result<u64, SkipReason> {
    if !req.bypass {
        match prefs.mode {
            DiscardMode::NumberBased => return Err(SkipReason::NumberMode),
            DiscardMode::UrlBased if !whitelist::matches(&prefs.whitelist_url, url) => {
                return Err(SkipReason::UrlNotListed);
            }
            _ => {}
        }
    }
    if !hidden {
        return Err(SkipReason::Visible);
    }
    if prefs.period == 0 && !req.manual {
        return Err(SkipReason::NoPeriod);
    }
    Ok(req.delay_ms.unwrap_or_else(|| prefs.period_ms()))
}

/// After gating: an exception clears the timer unless the request bypasses.
pub fn clears_on_exception(exception: bool, req: CheckRequest) -> bool {
    exception && !req.bypass
}

// ─── Fire verdict ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FireVerdict {
    Discard,
    /// Double-check before discarding found an exception.
    SkipException,
    /// The tab was opted out for this session.
    SkipNotAllowed,
}

pub fn fire_verdict(exception: bool, bypass: bool, allowed: bool) -> FireVerdict {
    if exception && !bypass {
        FireVerdict::SkipException
    } else if !allowed {
        FireVerdict::SkipNotAllowed
    } else {
        FireVerdict::Discard
    }
}

// ─── State machine ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum TimerPhase {
    Idle,
    Armed { deadline_ms: u64, bypass: bool },
    Firing { bypass: bool },
}

/// Returned by [`EligibilityTimer::arm`]; the caller schedules a callback
/// after `delay_ms` carrying `token`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmTicket {
    pub token: u64,
    pub deadline_ms: u64,
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FireRequest {
    pub bypass: bool,
}

#[derive(Debug, Clone)]
pub struct EligibilityTimer {
    phase: TimerPhase,
    token: u64,
}

impl Default for EligibilityTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl EligibilityTimer {
    pub fn new() -> Self {
        Self {
            phase: TimerPhase::Idle,
            token: 0,
        }
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn deadline_ms(&self) -> Option<u64> {
        match self.phase {
            TimerPhase::Armed { deadline_ms, .. } => Some(deadline_ms),
            _ => None,
        }
    }

    /// Arm (or re-arm) the deadline at `now_ms + delay_ms`.
    pub fn arm(&mut self, now_ms: u64, delay_ms: u64, bypass: bool) -> ArmTicket {
        self.token += 1;
        let deadline_ms = now_ms.saturating_add(delay_ms);
        self.phase = TimerPhase::Armed {
            deadline_ms,
            bypass,
        };
        ArmTicket {
            token: self.token,
            deadline_ms,
            delay_ms,
        }
    }

    /// Drop any armed deadline. Returns true if one was armed.
    pub fn clear(&mut self) -> bool {
        let was_armed = matches!(self.phase, TimerPhase::Armed { .. });
        self.token += 1;
        self.phase = TimerPhase::Idle;
        was_armed
    }

    /// Scheduled callback arrived. Stale tokens are ignored.
    pub fn on_deadline(&mut self, token: u64) -> Option<FireRequest> {
        match self.phase {
            TimerPhase::Armed { bypass, .. } if token == self.token => Some(self.enter_firing(bypass)),
            _ => None,
        }
    }

    /// Idle broadcast: fire only if the deadline has already passed.
    pub fn on_idle(&mut self, now_ms: u64) -> Option<FireRequest> {
        match self.phase {
            TimerPhase::Armed {
                deadline_ms,
                bypass,
            } if now_ms > deadline_ms => Some(self.enter_firing(bypass)),
            _ => None,
        }
    }

    /// Final decision taken; back to idle.
    pub fn finish(&mut self) {
        if matches!(self.phase, TimerPhase::Firing { .. }) {
            self.phase = TimerPhase::Idle;
        }
    }

    fn enter_firing(&mut self, bypass: bool) -> FireRequest {
        // invalidates the other wake source
        self.token += 1;
        self.phase = TimerPhase::Firing { bypass };
        FireRequest { bypass }
    }
}
