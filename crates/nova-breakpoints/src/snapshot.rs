use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

/// Copy-on-write list.
///
/// Readers take a cheap [`snapshot`](Self::snapshot) and iterate it without
/// holding the lock; a concurrent push or removal swaps in a new vector and
/// never disturbs an iteration already in progress.
pub struct SnapshotList<T> {
    items: RwLock<Arc<Vec<T>>>,
}

impl<T> Default for SnapshotList<T> {
    fn default() -> Self {
        Self {
            items: RwLock::new(Arc::new(Vec::new())),
        }
    }
}

impl<T: Clone> SnapshotList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<Vec<T>> {
        self.items.read().clone()
    }

    pub fn push(&self, item: T) {
        let mut items = self.items.write();
        Arc::make_mut(&mut *items).push(item);
    }

    /// Remove the first item matching `pred`. Returns whether one was removed.
    pub fn remove_first(&self, mut pred: impl FnMut(&T) -> bool) -> bool {
        let mut items = self.items.write();
        match items.iter().position(|item| pred(item)) {
            Some(index) => {
                Arc::make_mut(&mut *items).remove(index);
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        *self.items.write() = Arc::new(Vec::new());
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    pub fn any(&self, pred: impl FnMut(&T) -> bool) -> bool {
        self.snapshot().iter().any(pred)
    }
}

impl<T: Clone> Clone for SnapshotList<T> {
    fn clone(&self) -> Self {
        Self {
            items: RwLock::new(self.snapshot()),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for SnapshotList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.read().iter()).finish()
    }
}

impl<T: Clone> FromIterator<T> for SnapshotList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: RwLock::new(Arc::new(iter.into_iter().collect())),
        }
    }
}
