use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use super::list::same_instance;
use super::{MessageHandler, Registration};

type HandlerMap = HashMap<String, Arc<dyn MessageHandler>>;

/// One handler per command name.
///
/// The map is never mutated in place: `subscribe` and `unsubscribe` build a
/// new map and swap it in, so a dispatch always resolves against a complete
/// snapshot. A dispatch that already resolved a handler keeps using it even
/// if the handler is replaced afterwards.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<RwLock<Arc<HandlerMap>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `command`, replacing any existing handler.
    pub fn subscribe(&self, command: &str, handler: Arc<dyn MessageHandler>) -> Registration {
        let replaced = self.swap(|map| map.insert(command.to_string(), Arc::clone(&handler)));
        if replaced.is_some() {
            warn!(command = %command, "replaced existing command handler");
        } else {
            debug!(command = %command, "subscribed command handler");
        }

        let registry = self.clone();
        let command = command.to_string();
        Registration::new(move || registry.unsubscribe_if(&command, &handler))
    }

    /// Remove the handler for `command` only if it is still `handler`.
    pub fn unsubscribe_if(&self, command: &str, handler: &Arc<dyn MessageHandler>) -> bool {
        let current = self.snapshot();
        match current.get(command) {
            Some(existing) if same_instance(existing, handler) => {}
            _ => return false,
        }
        let removed = self.swap(|map| match map.get(command) {
            Some(existing) if same_instance(existing, handler) => map.remove(command),
            _ => None,
        });
        if removed.is_some() {
            debug!(command = %command, "unsubscribed command handler");
        }
        removed.is_some()
    }

    /// Remove whatever handler is registered for `command`.
    pub fn unsubscribe(&self, command: &str) -> bool {
        let removed = self.swap(|map| map.remove(command)).is_some();
        if removed {
            debug!(command = %command, "unsubscribed command handler");
        }
        removed
    }

    pub fn get(&self, command: &str) -> Option<Arc<dyn MessageHandler>> {
        self.snapshot().get(command).cloned()
    }

    pub fn contains(&self, command: &str) -> bool {
        self.snapshot().contains_key(command)
    }

    /// Registered command names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.snapshot().keys().cloned().collect();
        names.sort();
        names
    }

    fn snapshot(&self) -> Arc<HandlerMap> {
        Arc::clone(&self.handlers.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn swap<R>(&self, update: impl FnOnce(&mut HandlerMap) -> R) -> R {
        let mut guard = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = HandlerMap::clone(&guard);
        let out = update(&mut next);
        *guard = Arc::new(next);
        out
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("commands", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::unit_of_work::UnitOfWork;
    use serde_json::Value;

    fn handler(value: i64) -> Arc<dyn MessageHandler> {
        Arc::new(move |_: &mut UnitOfWork| -> Result<Value, HandlerError> { Ok(Value::from(value)) })
    }

    #[test]
    fn subscribe_replaces_existing_handler() {
        let registry = HandlerRegistry::new();
        let first = handler(1);
        let second = handler(2);

        registry.subscribe("cmd", Arc::clone(&first));
        registry.subscribe("cmd", Arc::clone(&second));

        let current = registry.get("cmd").unwrap();
        assert!(same_instance(&current, &second));
        assert_eq!(registry.names(), vec!["cmd".to_string()]);
    }

    #[test]
    fn stale_registration_does_not_remove_replacement() {
        let registry = HandlerRegistry::new();
        let old = registry.subscribe("cmd", handler(1));
        let new = registry.subscribe("cmd", handler(2));

        assert!(!old.cancel());
        assert!(registry.contains("cmd"));
        assert!(new.cancel());
        assert!(!registry.contains("cmd"));
    }

    #[test]
    fn unsubscribe_removes_any_handler_once() {
        let registry = HandlerRegistry::new();
        let registration = registry.subscribe("cmd", handler(1));
        registry.subscribe("other", handler(2));

        assert!(registry.unsubscribe("cmd"));
        assert!(registry.get("cmd").is_none());
        assert!(!registry.unsubscribe("cmd"));
        assert!(!registration.cancel(), "handle outlived its handler");
        assert!(registry.contains("other"));
    }

    #[test]
    fn resolved_handler_survives_replacement() {
        let registry = HandlerRegistry::new();
        registry.subscribe("cmd", handler(1));
        let captured = registry.get("cmd").unwrap();
        registry.subscribe("cmd", handler(2));

        let mut uow = UnitOfWork::start(crate::Message::with_string_payload("cmd", ""));
        assert_eq!(captured.handle(&mut uow).unwrap(), Value::from(1));
    }
}
