//! tabnap-host: browser IO boundary.
//! Provides the discard/navigate command surface, the live tab registry and
//! the platform power query. No decision logic: pure IO boundary.

pub mod error;
pub mod host;
pub mod power;
pub mod registry;

pub use error::HostError;
pub use host::{BrowserHost, CommandBatch, CommandQueue, HostCommand, SequencedCommand};
pub use power::{PowerSource, SysfsPowerSource};
pub use registry::{Activation, TabRegistry};
