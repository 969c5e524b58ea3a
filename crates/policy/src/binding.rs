//! Revocable handles for grants bound to a class loader or protection domain.

use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Token standing in for a class loader or protection domain.
///
/// Equality is by identity. Once unregistered a handle stays dead.
#[derive(Debug, Clone)]
pub struct BindingHandle {
    id: u64,
    live: Arc<AtomicBool>,
}

impl BindingHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_live(&self) -> bool {
        self.live.load(AtomicOrdering::Acquire)
    }
}

impl PartialEq for BindingHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for BindingHandle {}

impl Hash for BindingHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Ord for BindingHandle {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl PartialOrd for BindingHandle {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Issues and revokes [`BindingHandle`]s.
#[derive(Debug, Default)]
pub struct BindingArena {
    live: Mutex<HashMap<u64, Arc<AtomicBool>>>,
}

impl BindingArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self) -> BindingHandle {
        let id = NEXT_HANDLE_ID.fetch_add(1, AtomicOrdering::Relaxed);
        let live = Arc::new(AtomicBool::new(true));
        self.live.lock().insert(id, Arc::clone(&live));
        BindingHandle { id, live }
    }

    /// Kill `handle` and every clone of it. Returns `false` if it was not live here.
    pub fn unregister(&self, handle: &BindingHandle) -> bool {
        match self.live.lock().remove(&handle.id) {
            Some(flag) => {
                flag.store(false, AtomicOrdering::Release);
                true
            }
            None => false,
        }
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }
}

impl Drop for BindingArena {
    fn drop(&mut self) {
        for flag in self.live.get_mut().values() {
            flag.store(false, AtomicOrdering::Release);
        }
    }
}
