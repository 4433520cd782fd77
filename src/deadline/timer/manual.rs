use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use super::{DeadlineId, FireCallback, TimerError, TimerService};

struct Scheduled {
    id: DeadlineId,
    trigger_time: DateTime<Utc>,
    seq: u64,
    payload: Vec<u8>,
}

#[derive(Default)]
struct State {
    callback: Option<FireCallback>,
    scheduled: Vec<Scheduled>,
    next_seq: u64,
    unavailable: Option<String>,
}

/// Timer driven by the caller's clock, for tests and simulations.
///
/// Nothing fires on its own: call [`fire_due`](ManualTimerService::fire_due)
/// or [`fire_all`](ManualTimerService::fire_all). Callbacks run on the
/// calling thread. Clones share the same schedule.
#[derive(Clone, Default)]
pub struct ManualTimerService {
    state: Arc<Mutex<State>>,
}

impl ManualTimerService {
    pub fn new() -> Self {
        Self::default()
    }

    /// A timer whose `start` always fails, for exercising setup errors.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        let timer = Self::default();
        timer.lock().unavailable = Some(reason.into());
        timer
    }

    /// Fire every deadline due at `now`, in trigger order. Returns how many fired.
    pub fn fire_due(&self, now: DateTime<Utc>) -> usize {
        self.fire_where(|scheduled| scheduled.trigger_time <= now)
    }

    /// Fire everything still scheduled, regardless of trigger time.
    pub fn fire_all(&self) -> usize {
        self.fire_where(|_| true)
    }

    /// Hand `payload` to the fire callback as if the store redelivered it,
    /// e.g. after a restart.
    pub fn redeliver(&self, id: DeadlineId, payload: Vec<u8>) -> Result<(), TimerError> {
        let callback = self.lock().callback.clone().ok_or(TimerError::NotStarted)?;
        callback(id, payload);
        Ok(())
    }

    /// Scheduled deadlines and their trigger times, earliest first.
    pub fn pending(&self) -> Vec<(DeadlineId, DateTime<Utc>)> {
        let state = self.lock();
        let mut pending: Vec<_> = state
            .scheduled
            .iter()
            .map(|s| (s.trigger_time, s.seq, s.id.clone()))
            .collect();
        pending.sort();
        pending
            .into_iter()
            .map(|(trigger_time, _, id)| (id, trigger_time))
            .collect()
    }

    /// The stored payload of a scheduled deadline.
    pub fn payload(&self, id: &DeadlineId) -> Option<Vec<u8>> {
        self.lock()
            .scheduled
            .iter()
            .find(|s| &s.id == id)
            .map(|s| s.payload.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().scheduled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn fire_where(&self, is_due: impl Fn(&Scheduled) -> bool) -> usize {
        let (callback, mut due) = {
            let mut state = self.lock();
            let Some(callback) = state.callback.clone() else {
                return 0;
            };
            let (due, rest): (Vec<_>, Vec<_>) =
                state.scheduled.drain(..).partition(|s| is_due(s));
            state.scheduled = rest;
            (callback, due)
        };

        due.sort_by(|a, b| (a.trigger_time, a.seq).cmp(&(b.trigger_time, b.seq)));
        let fired = due.len();
        for scheduled in due {
            callback(scheduled.id, scheduled.payload);
        }
        fired
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TimerService for ManualTimerService {
    fn start(&self, on_fire: FireCallback) -> Result<(), TimerError> {
        let mut state = self.lock();
        if let Some(reason) = &state.unavailable {
            return Err(TimerError::Unavailable(reason.clone()));
        }
        if state.callback.is_some() {
            return Err(TimerError::AlreadyStarted);
        }
        state.callback = Some(on_fire);
        Ok(())
    }

    fn persist(&self, id: &DeadlineId, trigger_time: DateTime<Utc>, payload: Vec<u8>) -> Result<(), TimerError> {
        let mut state = self.lock();
        if state.callback.is_none() {
            return Err(TimerError::NotStarted);
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.scheduled.retain(|s| &s.id != id);
        state.scheduled.push(Scheduled {
            id: id.clone(),
            trigger_time,
            seq,
            payload,
        });
        Ok(())
    }

    fn cancel(&self, id: &DeadlineId) -> Result<bool, TimerError> {
        let mut state = self.lock();
        let before = state.scheduled.len();
        state.scheduled.retain(|s| &s.id != id);
        Ok(state.scheduled.len() != before)
    }
}
