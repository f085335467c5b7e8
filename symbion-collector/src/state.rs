use parking_lot::RwLock;
use std::sync::Arc;

/// Valeur remplacée en bloc : les lecteurs clonent l'Arc courant et ne voient
/// jamais une mise à jour partielle.
#[derive(Debug)]
pub struct Snapshot<T> {
    current: RwLock<Arc<T>>,
}

impl<T> Snapshot<T> {
    pub fn new(value: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(value)),
        }
    }

    pub fn load(&self) -> Arc<T> {
        self.current.read().clone()
    }

    pub fn store(&self, value: T) {
        *self.current.write() = Arc::new(value);
    }

    /// Read-modify-replace under the write lock. `f` must not block.
    pub fn update<R>(&self, f: impl FnOnce(&Arc<T>) -> (T, R)) -> R {
        let mut guard = self.current.write();
        let (next, out) = f(&*guard);
        *guard = Arc::new(next);
        out
    }
}
