//! Schedules deadlines and delivers them to the scopes that own them.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::{panic_message, HandlerError};
use crate::executor::{InlineExecutor, Task, TaskExecutor};
use crate::handler::list::CopyOnWriteList;
use crate::handler::{MessageHandler, Registration};
use crate::interceptor::{dispatch, DispatchInterceptor, HandlerInterceptor, InterceptorChain};
use crate::message::{Message, CORRELATION_ID};
use crate::unit_of_work::UnitOfWork;

use super::error::DeadlineError;
use super::record::{DeadlineId, DeadlineRecord, DeadlineStatus};
use super::scope::{ScopeAware, ScopeAwareProvider, ScopeDescriptor};
use super::timer::{FireCallback, TimerService};

/// Local view of a deadline scheduled through this manager.
struct Tracked {
    name: String,
    scope: ScopeDescriptor,
    state: AtomicU8,
}

impl Tracked {
    fn status(&self) -> DeadlineStatus {
        DeadlineStatus::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move from `Scheduled` to `to`. Only one caller can win.
    fn finish(&self, to: DeadlineStatus) -> bool {
        self.state
            .compare_exchange(
                DeadlineStatus::Scheduled.as_u8(),
                to.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

struct Inner {
    timer: Arc<dyn TimerService>,
    scopes: Arc<dyn ScopeAwareProvider>,
    executor: Arc<dyn TaskExecutor>,
    tracked: Mutex<HashMap<DeadlineId, Arc<Tracked>>>,
    dispatch_interceptors: CopyOnWriteList<dyn DispatchInterceptor>,
    handler_interceptors: CopyOnWriteList<dyn HandlerInterceptor>,
}

/// Schedules, cancels and delivers deadlines for aggregates and sagas.
///
/// Each deadline moves from `Scheduled` to either `Fired` or `Cancelled`,
/// never both. The transition is a compare-and-swap, so a cancel that loses
/// the race against a firing deadline is a no-op and delivery proceeds.
///
/// When a deadline fires, the manager asks the [`ScopeAwareProvider`] for
/// the live instances of its scope and delivers the deadline message to
/// each one in its own [`UnitOfWork`]. A failing target is logged and does
/// not affect the others. Delivery runs on the configured executor, which
/// defaults to the timer's own thread.
///
/// Fired and cancelled deadlines stay tracked so their status can still be
/// read and a late cancel stays a no-op. Nothing drops them automatically:
/// a long-running manager should call
/// [`purge_terminal`](DeadlineManager::purge_terminal) periodically.
///
/// ## Example
///
/// ```ignore
/// let scopes = ScopeRegistry::new();
/// let manager = DeadlineManager::builder()
///     .timer(Arc::new(ThreadTimerService::new()))
///     .scopes(Arc::new(scopes.clone()))
///     .build()?;
///
/// let order = ScopeDescriptor::aggregate("Order", "order-1");
/// let id = manager.schedule_after(&order, "payment_due", Vec::new(), Duration::from_secs(3600))?;
///
/// // Payment arrived in time
/// manager.cancel(&id)?;
/// ```
#[derive(Clone)]
pub struct DeadlineManager {
    inner: Arc<Inner>,
}

impl DeadlineManager {
    pub fn builder() -> DeadlineManagerBuilder {
        DeadlineManagerBuilder::default()
    }

    /// Schedule `payload` to be delivered to `scope` at `trigger_time`.
    ///
    /// The delivered message is named after the deadline.
    pub fn schedule(
        &self,
        scope: &ScopeDescriptor,
        name: &str,
        payload: Vec<u8>,
        trigger_time: DateTime<Utc>,
    ) -> Result<DeadlineId, DeadlineError> {
        self.schedule_message(scope, name, Message::new(name, payload), trigger_time)
    }

    /// Schedule `payload` to be delivered once `delay` has passed.
    pub fn schedule_after(
        &self,
        scope: &ScopeDescriptor,
        name: &str,
        payload: Vec<u8>,
        delay: Duration,
    ) -> Result<DeadlineId, DeadlineError> {
        let trigger_time = trigger_after(delay)?;
        self.schedule(scope, name, payload, trigger_time)
    }

    /// Schedule a prepared message, keeping its name, payload and metadata.
    pub fn schedule_message(
        &self,
        scope: &ScopeDescriptor,
        name: &str,
        message: Message,
        trigger_time: DateTime<Utc>,
    ) -> Result<DeadlineId, DeadlineError> {
        let id = DeadlineId::new();
        self.inner
            .schedule_with_id(id.clone(), scope, name, message, trigger_time)?;
        Ok(id)
    }

    /// Schedule a deadline only if `uow` commits.
    ///
    /// The id is returned straight away; the deadline is handed to the timer
    /// during PREPARE_COMMIT and cancelled again if the unit of work rolls
    /// back afterwards. The message carries the id of the message being
    /// handled as its correlation id.
    pub fn schedule_on_commit(
        &self,
        uow: &mut UnitOfWork,
        scope: &ScopeDescriptor,
        name: &str,
        payload: Vec<u8>,
        trigger_time: DateTime<Utc>,
    ) -> Result<DeadlineId, DeadlineError> {
        let id = DeadlineId::new();
        let message = Message::new(name, payload).with_metadata(CORRELATION_ID, uow.message().id());

        let manager = self.clone();
        let deadline = id.clone();
        let scope = scope.clone();
        let name = name.to_string();
        uow.on_prepare_commit(move |uow| {
            manager
                .inner
                .schedule_with_id(deadline.clone(), &scope, &name, message, trigger_time)
                .map_err(HandlerError::other)?;
            uow.on_rollback(move |_| {
                manager.cancel(&deadline).map_err(HandlerError::other)?;
                Ok(())
            })?;
            Ok(())
        })?;

        Ok(id)
    }

    /// Cancel a deadline.
    ///
    /// Returns `true` if the deadline was still scheduled. Cancelling a
    /// deadline that already fired or was cancelled does nothing. Ids this
    /// manager does not track (e.g. scheduled before a restart) are passed
    /// on to the timer.
    pub fn cancel(&self, id: &DeadlineId) -> Result<bool, DeadlineError> {
        match self.inner.get(id) {
            Some(tracked) => {
                if !tracked.finish(DeadlineStatus::Cancelled) {
                    debug!(deadline_id = %id, status = ?tracked.status(), "deadline already finished, cancel ignored");
                    return Ok(false);
                }
                self.inner.timer.cancel(id)?;
                debug!(deadline_id = %id, deadline = %tracked.name, scope = %tracked.scope, "deadline cancelled");
                Ok(true)
            }
            None => Ok(self.inner.timer.cancel(id)?),
        }
    }

    /// Cancel every scheduled deadline named `name`. Returns how many were cancelled.
    pub fn cancel_all(&self, name: &str) -> Result<usize, DeadlineError> {
        self.cancel_matching(|tracked| tracked.name == name)
    }

    /// Cancel every scheduled deadline named `name` owned by `scope`.
    pub fn cancel_all_within_scope(
        &self,
        name: &str,
        scope: &ScopeDescriptor,
    ) -> Result<usize, DeadlineError> {
        self.cancel_matching(|tracked| tracked.name == name && &tracked.scope == scope)
    }

    /// State of a deadline scheduled through this manager, if still tracked.
    pub fn status(&self, id: &DeadlineId) -> Option<DeadlineStatus> {
        self.inner.get(id).map(|tracked| tracked.status())
    }

    /// Deadlines still waiting to fire.
    pub fn scheduled(&self) -> usize {
        self.inner
            .lock()
            .values()
            .filter(|tracked| tracked.status() == DeadlineStatus::Scheduled)
            .count()
    }

    /// Forget fired and cancelled deadlines. Returns how many were dropped.
    ///
    /// Their status is no longer reported afterwards, and a late redelivery
    /// of a purged deadline by the timer is delivered again.
    pub fn purge_terminal(&self) -> usize {
        let mut tracked = self.inner.lock();
        let before = tracked.len();
        tracked.retain(|_, deadline| deadline.status() == DeadlineStatus::Scheduled);
        before - tracked.len()
    }

    /// Run on every deadline message when it is scheduled.
    pub fn register_dispatch_interceptor(&self, interceptor: Arc<dyn DispatchInterceptor>) -> Registration {
        self.inner.dispatch_interceptors.push(interceptor)
    }

    /// Wrap every delivery to a scope target.
    pub fn register_handler_interceptor(&self, interceptor: Arc<dyn HandlerInterceptor>) -> Registration {
        self.inner.handler_interceptors.push(interceptor)
    }

    fn cancel_matching(&self, matches: impl Fn(&Tracked) -> bool) -> Result<usize, DeadlineError> {
        let ids: Vec<DeadlineId> = self
            .inner
            .lock()
            .iter()
            .filter(|(_, tracked)| tracked.status() == DeadlineStatus::Scheduled && matches(tracked))
            .map(|(id, _)| id.clone())
            .collect();

        let mut cancelled = 0;
        for id in ids {
            if self.cancel(&id)? {
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }
}

impl fmt::Debug for DeadlineManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeadlineManager")
            .field("tracked", &self.inner.lock().len())
            .field("scheduled", &self.scheduled())
            .finish()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HashMap<DeadlineId, Arc<Tracked>>> {
        self.tracked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get(&self, id: &DeadlineId) -> Option<Arc<Tracked>> {
        self.lock().get(id).cloned()
    }

    fn schedule_with_id(
        &self,
        id: DeadlineId,
        scope: &ScopeDescriptor,
        name: &str,
        message: Message,
        trigger_time: DateTime<Utc>,
    ) -> Result<(), DeadlineError> {
        let message = dispatch::apply(&self.dispatch_interceptors.snapshot(), message)
            .map_err(DeadlineError::Rejected)?;
        let record = DeadlineRecord::new(id.clone(), name, scope.clone(), trigger_time, message);
        let bytes = record.to_bytes()?;

        // Tracked before the timer sees it, so an immediate fire finds it.
        self.lock().insert(
            id.clone(),
            Arc::new(Tracked {
                name: name.to_string(),
                scope: scope.clone(),
                state: AtomicU8::new(DeadlineStatus::Scheduled.as_u8()),
            }),
        );

        if let Err(err) = self.timer.persist(&id, trigger_time, bytes) {
            self.lock().remove(&id);
            warn!(deadline_id = %id, deadline = %name, error = %err, "failed to persist deadline");
            return Err(err.into());
        }

        debug!(
            deadline_id = %id,
            deadline = %name,
            scope = %scope,
            trigger_time = %trigger_time,
            "deadline scheduled"
        );
        Ok(())
    }

    fn on_fire(self: &Arc<Self>, id: DeadlineId, payload: Vec<u8>) {
        let record = match DeadlineRecord::from_bytes(&payload) {
            Ok(record) => record,
            Err(err) => {
                error!(deadline_id = %id, error = %err, "discarding unreadable deadline");
                return;
            }
        };

        // Untracked deadlines (e.g. persisted before a restart) are delivered.
        if let Some(tracked) = self.get(&id) {
            if !tracked.finish(DeadlineStatus::Fired) {
                debug!(deadline_id = %id, status = ?tracked.status(), "deadline no longer scheduled, not delivering");
                return;
            }
        }

        let inner = Arc::clone(self);
        let task: Task = Box::new(move || inner.deliver(record));
        if let Err(err) = self.executor.execute(task) {
            error!(deadline_id = %id, error = %err, "executor rejected deadline delivery");
        }
    }

    fn deliver(&self, record: DeadlineRecord) {
        let targets = self.scopes.resolve(&record.scope);
        if targets.is_empty() {
            info!(
                deadline_id = %record.id,
                deadline = %record.name,
                scope = %record.scope,
                "no live instance for deadline scope, discarding"
            );
            return;
        }

        let interceptors = self.handler_interceptors.snapshot();
        let message = record.to_message();

        for target in targets {
            let handler: Arc<dyn MessageHandler> = Arc::new(ScopedDelivery(target));
            let chain = InterceptorChain::new(Arc::clone(&interceptors), handler);

            let mut uow = UnitOfWork::start(message.clone());
            match uow.execute_with_result(|uow| chain.proceed(uow)) {
                Ok(_) => debug!(
                    deadline_id = %record.id,
                    deadline = %record.name,
                    scope = %record.scope,
                    "deadline delivered"
                ),
                Err(err) => error!(
                    deadline_id = %record.id,
                    deadline = %record.name,
                    scope = %record.scope,
                    error = %err,
                    "deadline handler failed"
                ),
            }
        }
    }
}

/// Adapts a scope target to the handler interface the interceptor chain ends in.
struct ScopedDelivery(Arc<dyn ScopeAware>);

impl MessageHandler for ScopedDelivery {
    fn handle(&self, uow: &mut UnitOfWork) -> Result<Value, HandlerError> {
        self.0.handle_deadline(uow)?;
        Ok(Value::Null)
    }
}

fn trigger_after(delay: Duration) -> Result<DateTime<Utc>, DeadlineError> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| Utc::now().checked_add_signed(delay))
        .ok_or_else(|| DeadlineError::InvalidTrigger(format!("delay of {:?} is out of range", delay)))
}

/// Builder for [`DeadlineManager`].
///
/// The built manager keeps every fired or cancelled deadline until
/// [`DeadlineManager::purge_terminal`] is called, so whoever owns it is
/// responsible for purging on a schedule that suits their volume.
#[derive(Default)]
pub struct DeadlineManagerBuilder {
    timer: Option<Arc<dyn TimerService>>,
    scopes: Option<Arc<dyn ScopeAwareProvider>>,
    executor: Option<Arc<dyn TaskExecutor>>,
    dispatch_interceptors: Vec<Arc<dyn DispatchInterceptor>>,
    handler_interceptors: Vec<Arc<dyn HandlerInterceptor>>,
}

impl DeadlineManagerBuilder {
    pub fn timer(mut self, timer: Arc<dyn TimerService>) -> Self {
        self.timer = Some(timer);
        self
    }

    pub fn scopes(mut self, scopes: Arc<dyn ScopeAwareProvider>) -> Self {
        self.scopes = Some(scopes);
        self
    }

    /// Where deliveries run. Defaults to the timer's thread.
    pub fn executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn dispatch_interceptor(mut self, interceptor: Arc<dyn DispatchInterceptor>) -> Self {
        self.dispatch_interceptors.push(interceptor);
        self
    }

    pub fn handler_interceptor(mut self, interceptor: Arc<dyn HandlerInterceptor>) -> Self {
        self.handler_interceptors.push(interceptor);
        self
    }

    /// Start the timer and build the manager.
    ///
    /// Fails with [`DeadlineError::Configuration`] if a collaborator is
    /// missing or the timer cannot start.
    pub fn build(self) -> Result<DeadlineManager, DeadlineError> {
        let timer = self
            .timer
            .ok_or_else(|| DeadlineError::Configuration("a timer service is required".to_string()))?;
        let scopes = self.scopes.ok_or_else(|| {
            DeadlineError::Configuration("a scope-aware provider is required".to_string())
        })?;

        let inner = Arc::new(Inner {
            timer,
            scopes,
            executor: self.executor.unwrap_or_else(|| Arc::new(InlineExecutor)),
            tracked: Mutex::new(HashMap::new()),
            dispatch_interceptors: CopyOnWriteList::default(),
            handler_interceptors: CopyOnWriteList::default(),
        });
        for interceptor in self.dispatch_interceptors {
            inner.dispatch_interceptors.push(interceptor);
        }
        for interceptor in self.handler_interceptors {
            inner.handler_interceptors.push(interceptor);
        }

        let weak = Arc::downgrade(&inner);
        let on_fire: FireCallback = Arc::new(move |id: DeadlineId, payload: Vec<u8>| {
            let Some(inner) = weak.upgrade() else {
                debug!(deadline_id = %id, "deadline manager dropped, ignoring fired deadline");
                return;
            };
            let fired = id.clone();
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| inner.on_fire(id, payload))) {
                error!(deadline_id = %fired, panic = %panic_message(panic.as_ref()), "deadline delivery panicked");
            }
        });

        inner
            .timer
            .start(on_fire)
            .map_err(|err| DeadlineError::Configuration(format!("timer service failed to start: {}", err)))?;

        debug!("deadline manager started");
        Ok(DeadlineManager { inner })
    }
}
