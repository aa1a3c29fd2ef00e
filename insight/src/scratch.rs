use std::sync::{Mutex, MutexGuard, TryLockError};

use insight_common::pipeline::Zeroable;

/// One reusable staging record per worker, allocated once up front.
///
/// A record that is already in use on its worker is reported as unavailable rather
/// than waited for.
pub struct ScratchPool<T> {
    records: Vec<Mutex<Box<T>>>,
}

impl<T: Zeroable> ScratchPool<T> {
    pub fn new(workers: usize) -> Self {
        Self {
            records: (0..workers.max(1))
                .map(|_| Mutex::new(Box::new(T::zeroed())))
                .collect(),
        }
    }

    pub fn workers(&self) -> usize {
        self.records.len()
    }

    pub fn acquire(&self, worker: usize) -> Option<MutexGuard<'_, Box<T>>> {
        match self.records.get(worker)?.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }
}

#[cfg(test)]
mod test {
    use insight_common::event::PollEvent;

    use super::ScratchPool;

    #[test]
    fn busy_or_missing_worker_is_unavailable() {
        let pool = ScratchPool::<PollEvent>::new(2);
        let held = pool.acquire(0).unwrap();
        assert!(pool.acquire(0).is_none());
        assert!(pool.acquire(1).is_some());
        assert!(pool.acquire(2).is_none());
        drop(held);
        assert!(pool.acquire(0).is_some());
    }
}
