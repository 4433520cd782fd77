//! Timer services: persist deadlines and call back when they are due.

mod manual;
mod thread;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::TimerError;
use super::record::DeadlineId;

pub use manual::ManualTimerService;
pub use thread::ThreadTimerService;

/// Called by the timer, on its own thread, once per due deadline.
pub type FireCallback = Arc<dyn Fn(DeadlineId, Vec<u8>) + Send + Sync>;

/// External scheduler the deadline manager relies on.
///
/// Implementations own persistence: a deadline accepted by `persist` must
/// eventually be passed to the fire callback at or after its trigger time,
/// unless it is cancelled first. Delivering the same deadline more than once
/// is allowed.
pub trait TimerService: Send + Sync {
    /// Install the fire callback and start timing. Called once, at setup.
    fn start(&self, on_fire: FireCallback) -> Result<(), TimerError>;

    /// Store an opaque payload to be handed back at `trigger_time`.
    /// Persisting an existing id replaces it.
    fn persist(&self, id: &DeadlineId, trigger_time: DateTime<Utc>, payload: Vec<u8>) -> Result<(), TimerError>;

    /// Forget a deadline. Returns `true` if it was still pending.
    fn cancel(&self, id: &DeadlineId) -> Result<bool, TimerError>;
}

/// Settings for [`ThreadTimerService`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    pub thread_name: String,
    /// Longest the timer thread sleeps when nothing is due.
    pub idle_wait_ms: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            thread_name: "deadline-timer".to_string(),
            idle_wait_ms: 60_000,
        }
    }
}
