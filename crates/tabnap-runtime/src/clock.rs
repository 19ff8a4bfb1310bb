//! Engine clock: wall-clock epoch milliseconds.
//!
//! Deadlines are stored and compared in wall time so that a host suspend,
//! which stops the monotonic clock, still counts toward a tab's idle period.
//! Tokio timers only provide the scheduled wake-up.

#[cfg(test)]
use std::sync::Arc;
#[cfg(test)]
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(test)]
use tokio::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct Clock {
    source: Source,
}

#[derive(Debug, Clone, Default)]
enum Source {
    #[default]
    Wall,
    /// Follows tokio time from a fixed origin, plus wall time skipped with
    /// [`Clock::skip_wall`].
    #[cfg(test)]
    Anchored {
        origin: Instant,
        origin_ms: u64,
        skew_ms: Arc<AtomicU64>,
    },
}

impl Clock {
    pub fn wall() -> Self {
        Self::default()
    }

    /// Clock for paused-time tests: starts at `origin_ms` and advances with
    /// tokio time.
    #[cfg(test)]
    pub fn starting_at(origin_ms: u64) -> Self {
        Self {
            source: Source::Anchored {
                origin: Instant::now(),
                origin_ms,
                skew_ms: Arc::new(AtomicU64::new(0)),
            },
        }
    }

    /// Move wall time forward without moving tokio time, as a host suspend
    /// does. Shared by every clone.
    #[cfg(test)]
    pub fn skip_wall(&self, ms: u64) {
        if let Source::Anchored { skew_ms, .. } = &self.source {
            skew_ms.fetch_add(ms, Ordering::SeqCst);
        }
    }

    pub fn now_ms(&self) -> u64 {
        match &self.source {
            Source::Wall => chrono::Utc::now().timestamp_millis().max(0) as u64,
            #[cfg(test)]
            Source::Anchored {
                origin,
                origin_ms,
                skew_ms,
            } => origin_ms
                .saturating_add(origin.elapsed().as_millis() as u64)
                .saturating_add(skew_ms.load(Ordering::SeqCst)),
        }
    }
}
