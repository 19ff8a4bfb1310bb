//! tabnap-core: discard-eligibility decision engine.
//!
//! Pure, deterministic building blocks shared by the runtime: preferences,
//! whitelist matching, the exception breakdown, the per-tab eligibility timer
//! and the census selection. All time values are epoch milliseconds passed in
//! by the caller.

pub mod census;
pub mod error;
pub mod exceptions;
pub mod prefs;
pub mod restore;
pub mod timer;
pub mod types;
pub mod whitelist;

pub use error::CoreError;
pub use prefs::{DiscardMode, Preferences, PrefsDelta};
pub use types::{EligibilityReport, TabId, TabSnapshot, TabStatus, TabUpdate};
