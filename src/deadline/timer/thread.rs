use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use crate::error::panic_message;

use super::{DeadlineId, FireCallback, TimerConfig, TimerError, TimerService};

struct Entry {
    seq: u64,
    payload: Vec<u8>,
}

#[derive(Default)]
struct State {
    queue: BinaryHeap<Reverse<(DateTime<Utc>, u64, DeadlineId)>>,
    entries: HashMap<DeadlineId, Entry>,
    next_seq: u64,
    callback: Option<FireCallback>,
    stopped: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-process timer running on one dedicated thread.
///
/// Deadlines live in memory only, so they do not survive a restart. The
/// thread sleeps until the earliest trigger time (or `idle_wait_ms`) and
/// calls the fire callback outside its lock. A panicking callback is logged
/// and the thread keeps going.
///
/// ## Example
///
/// ```ignore
/// let timer = Arc::new(ThreadTimerService::new());
/// let manager = DeadlineManager::builder()
///     .timer(timer.clone())
///     .scopes(Arc::new(scopes))
///     .build()?;
///
/// // ... on shutdown
/// timer.stop();
/// ```
pub struct ThreadTimerService {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
    config: TimerConfig,
}

impl ThreadTimerService {
    pub fn new() -> Self {
        Self::with_config(TimerConfig::default())
    }

    pub fn with_config(config: TimerConfig) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            handle: Mutex::new(None),
            config,
        }
    }

    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    /// Deadlines persisted and not yet fired or cancelled.
    pub fn pending(&self) -> usize {
        self.shared.lock().entries.len()
    }

    /// Stop the timer thread and wait for it to exit. Pending deadlines are dropped.
    pub fn stop(&self) {
        {
            let mut state = self.shared.lock();
            if state.stopped {
                return;
            }
            state.stopped = true;
        }
        self.shared.wake.notify_all();

        let handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            // Stopping from inside a fire callback must not join itself.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
        debug!(name = %self.config.thread_name, "timer stopped");
    }
}

impl Default for ThreadTimerService {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerService for ThreadTimerService {
    fn start(&self, on_fire: FireCallback) -> Result<(), TimerError> {
        {
            let mut state = self.shared.lock();
            if state.stopped {
                return Err(TimerError::Stopped);
            }
            if state.callback.is_some() {
                return Err(TimerError::AlreadyStarted);
            }
            state.callback = Some(on_fire);
        }

        let shared = Arc::clone(&self.shared);
        let idle_wait = Duration::from_millis(self.config.idle_wait_ms);
        let spawned = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || run(shared, idle_wait));

        match spawned {
            Ok(handle) => {
                *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
                debug!(name = %self.config.thread_name, "timer started");
                Ok(())
            }
            Err(e) => {
                self.shared.lock().callback = None;
                Err(TimerError::Unavailable(e.to_string()))
            }
        }
    }

    fn persist(&self, id: &DeadlineId, trigger_time: DateTime<Utc>, payload: Vec<u8>) -> Result<(), TimerError> {
        {
            let mut state = self.shared.lock();
            if state.stopped {
                return Err(TimerError::Stopped);
            }
            if state.callback.is_none() {
                return Err(TimerError::NotStarted);
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            state.entries.insert(id.clone(), Entry { seq, payload });
            state.queue.push(Reverse((trigger_time, seq, id.clone())));
        }
        self.shared.wake.notify_one();
        Ok(())
    }

    fn cancel(&self, id: &DeadlineId) -> Result<bool, TimerError> {
        // The heap entry is skipped lazily once its entry is gone.
        Ok(self.shared.lock().entries.remove(id).is_some())
    }
}

impl Drop for ThreadTimerService {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(shared: Arc<Shared>, idle_wait: Duration) {
    let mut state = shared.lock();

    loop {
        if state.stopped {
            break;
        }

        let now = Utc::now();
        let mut due = Vec::new();
        while let Some(Reverse((trigger, _, _))) = state.queue.peek() {
            if *trigger > now {
                break;
            }
            let Some(Reverse((_, seq, id))) = state.queue.pop() else {
                break;
            };
            if state.entries.get(&id).is_some_and(|entry| entry.seq == seq) {
                if let Some(entry) = state.entries.remove(&id) {
                    due.push((id, entry.payload));
                }
            }
        }

        if !due.is_empty() {
            let callback = state.callback.clone();
            drop(state);
            if let Some(callback) = callback {
                for (id, payload) in due {
                    let fired = id.clone();
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(id, payload))) {
                        error!(deadline_id = %fired, panic = %panic_message(payload.as_ref()), "deadline callback panicked");
                    }
                }
            }
            state = shared.lock();
            continue;
        }

        let wait = match state.queue.peek() {
            Some(Reverse((trigger, _, _))) => (*trigger - now)
                .to_std()
                .unwrap_or(Duration::ZERO)
                .min(idle_wait),
            None => idle_wait,
        };
        state = match shared.wake.wait_timeout(state, wait) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        };
    }
}
