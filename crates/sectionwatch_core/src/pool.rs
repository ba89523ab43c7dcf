use std::ops::{Deref, DerefMut};
use std::sync::Mutex;

use crate::config::DEFAULT_POOL_CAPACITY;

/// Reuse pool for expensive-to-build instances.
///
/// `acquire` never blocks on availability: when storage is empty a fresh
/// instance is built by the factory. Capacity only bounds how many idle
/// instances are retained; `release` drops the instance once storage is full.
pub struct EnginePool<T> {
    factory: Box<dyn Fn() -> T + Send + Sync>,
    idle: Mutex<Vec<T>>,
    capacity: usize,
}

impl<T> EnginePool<T> {
    pub fn new<F>(capacity: usize, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            idle: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn with_default_capacity<F>(factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::new(DEFAULT_POOL_CAPACITY, factory)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn idle_count(&self) -> usize {
        self.lock_idle().len()
    }

    /// Take an instance out of the pool. It returns to the pool when the guard drops.
    pub fn acquire(&self) -> PooledEngine<'_, T> {
        let reused = self.lock_idle().pop();
        let engine = reused.unwrap_or_else(|| (self.factory)());
        PooledEngine {
            pool: self,
            engine: Some(engine),
        }
    }

    /// Return an instance. Returns false when the pool was full and it was dropped.
    pub fn release(&self, engine: T) -> bool {
        let mut idle = self.lock_idle();
        if idle.len() >= self.capacity {
            return false;
        }
        idle.push(engine);
        true
    }

    fn lock_idle(&self) -> std::sync::MutexGuard<'_, Vec<T>> {
        self.idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct PooledEngine<'a, T> {
    pool: &'a EnginePool<T>,
    engine: Option<T>,
}

impl<T> PooledEngine<'_, T> {
    /// Hand the instance back explicitly instead of waiting for drop.
    pub fn release(mut self) -> bool {
        match self.engine.take() {
            Some(engine) => self.pool.release(engine),
            None => false,
        }
    }
}

impl<T> Deref for PooledEngine<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.engine.as_ref() {
            Some(engine) => engine,
            None => unreachable!("pooled engine used after release"),
        }
    }
}

impl<T> DerefMut for PooledEngine<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match self.engine.as_mut() {
            Some(engine) => engine,
            None => unreachable!("pooled engine used after release"),
        }
    }
}

impl<T> Drop for PooledEngine<'_, T> {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            self.pool.release(engine);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier, Mutex};
    use std::thread;

    use super::EnginePool;

    struct Counted {
        id: usize,
    }

    fn counting_pool(capacity: usize) -> (EnginePool<Counted>, Arc<AtomicUsize>) {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let pool = EnginePool::new(capacity, move || Counted {
            id: counter.fetch_add(1, Ordering::SeqCst),
        });
        (pool, built)
    }

    #[test]
    fn acquire_builds_lazily_and_reuses_released_instances() {
        let (pool, built) = counting_pool(5);
        assert_eq!(pool.idle_count(), 0);

        let first_id = pool.acquire().id;
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert_eq!(pool.idle_count(), 1);

        let again = pool.acquire();
        assert_eq!(again.id, first_id);
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_discards_beyond_capacity() {
        let (pool, built) = counting_pool(2);
        let held: Vec<_> = (0..4).map(|_| pool.acquire()).collect();
        assert_eq!(built.load(Ordering::SeqCst), 4);

        let kept: Vec<bool> = held.into_iter().map(|guard| guard.release()).collect();
        assert_eq!(kept, vec![true, true, false, false]);
        assert_eq!(pool.idle_count(), 2);
    }

    #[test]
    fn concurrent_holders_never_share_an_instance() {
        let threads = 8;
        let (pool, _) = counting_pool(3);
        let barrier = Barrier::new(threads);
        let in_use = Mutex::new(HashSet::new());
        let violations = AtomicUsize::new(0);

        thread::scope(|scope| {
            for _ in 0..threads {
                scope.spawn(|| {
                    barrier.wait();
                    for _ in 0..200 {
                        let guard = pool.acquire();
                        if !in_use.lock().expect("lock").insert(guard.id) {
                            violations.fetch_add(1, Ordering::SeqCst);
                        }
                        thread::yield_now();
                        in_use.lock().expect("lock").remove(&guard.id);
                    }
                });
            }
        });

        assert_eq!(violations.load(Ordering::SeqCst), 0);
        assert!(pool.idle_count() <= pool.capacity());
    }
}
