//! Copy-on-write list behind interceptor and enhancer registration.

use std::sync::{Arc, PoisonError, RwLock};

use super::Registration;

/// Compare two shared instances by address, ignoring trait-object metadata.
pub(crate) fn same_instance<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

/// Readers take a snapshot and iterate it without holding the lock;
/// writers replace the whole list.
pub(crate) struct CopyOnWriteList<T: ?Sized> {
    items: Arc<RwLock<Arc<Vec<Arc<T>>>>>,
}

impl<T: ?Sized> Clone for CopyOnWriteList<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}

impl<T: ?Sized> Default for CopyOnWriteList<T> {
    fn default() -> Self {
        Self {
            items: Arc::new(RwLock::new(Arc::new(Vec::new()))),
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> CopyOnWriteList<T> {
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        Arc::clone(&self.items.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn push(&self, item: Arc<T>) -> Registration {
        {
            let mut guard = self.items.write().unwrap_or_else(PoisonError::into_inner);
            let mut next = (**guard).clone();
            next.push(Arc::clone(&item));
            *guard = Arc::new(next);
        }
        let list = self.clone();
        Registration::new(move || list.remove(&item))
    }

    fn remove(&self, item: &Arc<T>) -> bool {
        let mut guard = self.items.write().unwrap_or_else(PoisonError::into_inner);
        match guard.iter().position(|existing| same_instance(existing, item)) {
            Some(index) => {
                let mut next = (**guard).clone();
                next.remove(index);
                *guard = Arc::new(next);
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.snapshot().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshots_are_unaffected_by_later_writes() {
        let list: CopyOnWriteList<str> = CopyOnWriteList::default();
        let first = list.push(Arc::from("a"));
        let before = list.snapshot();
        list.push(Arc::from("b"));

        assert_eq!(before.len(), 1);
        assert_eq!(list.len(), 2);

        assert!(first.cancel());
        let after = list.snapshot();
        assert_eq!(after.len(), 1);
        assert_eq!(&*after[0], "b");
    }

    #[test]
    fn cancel_removes_only_its_own_entry() {
        let list: CopyOnWriteList<str> = CopyOnWriteList::default();
        let shared: Arc<str> = Arc::from("same");
        let a = list.push(Arc::clone(&shared));
        let b = list.push(shared);

        assert!(a.cancel());
        assert!(b.cancel());
        assert_eq!(list.len(), 0);
    }
}
