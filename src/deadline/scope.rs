//! Scopes own deadlines; the provider finds who is alive in a scope.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::HandlerError;
use crate::handler::list::same_instance;
use crate::handler::Registration;
use crate::unit_of_work::UnitOfWork;

/// The kind of stateful handler a scope belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Aggregate,
    Saga,
}

/// Identifies the stateful handler instance that owns a deadline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeDescriptor {
    kind: ScopeKind,
    scope_type: String,
    id: String,
}

impl ScopeDescriptor {
    pub fn new(kind: ScopeKind, scope_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind,
            scope_type: scope_type.into(),
            id: id.into(),
        }
    }

    pub fn aggregate(aggregate_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(ScopeKind::Aggregate, aggregate_type, id)
    }

    pub fn saga(saga_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(ScopeKind::Saga, saga_type, id)
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    pub fn scope_type(&self) -> &str {
        &self.scope_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ScopeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope_type, self.id)
    }
}

/// A live handler instance that can receive deadline messages.
///
/// The deadline message is `uow.message()`; its metadata names the deadline.
pub trait ScopeAware: Send + Sync {
    fn handle_deadline(&self, uow: &mut UnitOfWork) -> Result<(), HandlerError>;
}

impl<F> ScopeAware for F
where
    F: Fn(&mut UnitOfWork) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle_deadline(&self, uow: &mut UnitOfWork) -> Result<(), HandlerError> {
        self(uow)
    }
}

/// Answers "which live instances own this scope" when a deadline fires.
pub trait ScopeAwareProvider: Send + Sync {
    /// May return an empty list when the instance no longer exists.
    fn resolve(&self, scope: &ScopeDescriptor) -> Vec<Arc<dyn ScopeAware>>;
}

/// In-memory provider. Aggregates and sagas register themselves while they
/// are loaded and unregister when they go away.
#[derive(Clone, Default)]
pub struct ScopeRegistry {
    scopes: Arc<Mutex<HashMap<ScopeDescriptor, Vec<Arc<dyn ScopeAware>>>>>,
}

impl ScopeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `handler` a target for deadlines in `scope`.
    pub fn register(&self, scope: ScopeDescriptor, handler: Arc<dyn ScopeAware>) -> Registration {
        self.lock()
            .entry(scope.clone())
            .or_default()
            .push(Arc::clone(&handler));
        debug!(scope = %scope, "registered scope handler");

        let registry = self.clone();
        Registration::new(move || registry.remove(&scope, &handler))
    }

    /// Drop every handler of `scope`, e.g. when the aggregate is deleted.
    pub fn unregister_all(&self, scope: &ScopeDescriptor) -> usize {
        self.lock().remove(scope).map(|handlers| handlers.len()).unwrap_or(0)
    }

    pub fn contains(&self, scope: &ScopeDescriptor) -> bool {
        self.lock().contains_key(scope)
    }

    fn remove(&self, scope: &ScopeDescriptor, handler: &Arc<dyn ScopeAware>) -> bool {
        let mut scopes = self.lock();
        let Some(handlers) = scopes.get_mut(scope) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|existing| !same_instance(existing, handler));
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            scopes.remove(scope);
        }
        removed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ScopeDescriptor, Vec<Arc<dyn ScopeAware>>>> {
        self.scopes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ScopeAwareProvider for ScopeRegistry {
    fn resolve(&self, scope: &ScopeDescriptor) -> Vec<Arc<dyn ScopeAware>> {
        self.lock().get(scope).cloned().unwrap_or_default()
    }
}

impl fmt::Debug for ScopeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeRegistry")
            .field("scopes", &self.lock().len())
            .finish()
    }
}
