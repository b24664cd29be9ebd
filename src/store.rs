use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use uuid::Uuid;

/// Key-value storage for finished results, keyed by the id handed back to callers.
pub trait Repository<T>: Send + Sync {
    fn get(&self, id: &Uuid) -> Option<T>;

    fn put(&self, id: Uuid, value: T);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub const DEFAULT_REPOSITORY_CAPACITY: usize = 10_000;

/// Process-local repository. Values are cloned in and out. Holds at most `capacity`
/// entries; once full, each new id evicts the oldest one.
#[derive(Debug)]
pub struct InMemoryRepository<T> {
    inner: Mutex<Entries<T>>,
    capacity: usize,
}

#[derive(Debug)]
struct Entries<T> {
    items: HashMap<Uuid, T>,
    order: VecDeque<Uuid>,
}

impl<T> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self::with_capacity_limit(DEFAULT_REPOSITORY_CAPACITY)
    }
}

impl<T> InMemoryRepository<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A repository that keeps the `capacity` most recently inserted ids (at least one).
    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Entries { items: HashMap::new(), order: VecDeque::new() }),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // A poisoned lock still holds consistent data: no operation panics midway.
    fn entries(&self) -> MutexGuard<'_, Entries<T>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Clone + Send> Repository<T> for InMemoryRepository<T> {
    fn get(&self, id: &Uuid) -> Option<T> {
        self.entries().items.get(id).cloned()
    }

    fn put(&self, id: Uuid, value: T) {
        let mut entries = self.entries();
        if entries.items.insert(id, value).is_some() {
            return;
        }
        entries.order.push_back(id);
        while entries.order.len() > self.capacity {
            if let Some(oldest) = entries.order.pop_front() {
                entries.items.remove(&oldest);
                log::debug!("Evicted stored result {}", oldest);
            }
        }
    }

    fn len(&self) -> usize {
        self.entries().items.len()
    }
}
