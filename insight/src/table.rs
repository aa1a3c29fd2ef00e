//! Bounded keyed store with least-recently-used eviction.
//!
//! Backs every correlation table and the path cache on the host. Operations are
//! single-key and atomic; inserting into a full table silently evicts the entry that
//! was touched longest ago instead of failing.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

use insight_common::event::PathEntry;
use insight_common::pipeline::{CorrelationTable, PathCache};
use insight_common::{InsightError, FILENAME_LEN};

struct Inner<K, V> {
    entries: HashMap<K, (V, u64)>,
    recency: BTreeMap<u64, K>,
    tick: u64,
}

pub struct BoundedTable<K, V> {
    capacity: usize,
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> BoundedTable<K, V>
where
    K: Hash + Eq + Clone,
    V: Copy,
{
    pub fn with_max_entries(capacity: u32) -> Self {
        Self {
            capacity: (capacity as usize).max(1),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                recency: BTreeMap::new(),
                tick: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks at an entry without refreshing its recency.
    pub fn peek(&self, key: &K) -> Option<V> {
        self.lock().entries.get(key).map(|(value, _)| *value)
    }

    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.lock();
        inner.tick += 1;
        let tick = inner.tick;

        if let Some((_, old)) = inner.entries.insert(key.clone(), (value, tick)) {
            inner.recency.remove(&old);
        }
        inner.recency.insert(tick, key);

        while inner.entries.len() > self.capacity {
            let Some((_, oldest)) = inner.recency.pop_first() else {
                break;
            };
            inner.entries.remove(&oldest);
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.lock();
        inner.tick += 1;
        let tick = inner.tick;

        let (value, last) = inner.entries.get_mut(key)?;
        let value = *value;
        let previous = std::mem::replace(last, tick);
        inner.recency.remove(&previous);
        inner.recency.insert(tick, key.clone());
        Some(value)
    }

    pub fn delete(&self, key: &K) -> Option<V> {
        let mut inner = self.lock();
        let (value, tick) = inner.entries.remove(key)?;
        inner.recency.remove(&tick);
        Some(value)
    }
}

impl<K, V> CorrelationTable<K, V> for BoundedTable<K, V>
where
    K: Hash + Eq + Clone,
    V: Copy,
{
    fn record(&self, key: &K, value: &V) -> Result<(), InsightError> {
        self.insert(key.clone(), *value);
        Ok(())
    }

    fn lookup(&self, key: &K) -> Option<V> {
        self.get(key)
    }

    fn remove(&self, key: &K) {
        let _ = self.delete(key); // absent keys are fine
    }
}

impl PathCache for BoundedTable<u64, PathEntry> {
    fn insert(&self, file: u64, entry: &PathEntry) -> Result<(), InsightError> {
        BoundedTable::insert(self, file, *entry);
        Ok(())
    }

    fn copy_into(&self, file: u64, dest: &mut [u8; FILENAME_LEN]) -> bool {
        match self.get(&file) {
            Some(entry) => {
                *dest = entry.filename;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::BoundedTable;

    #[test]
    fn evicts_least_recently_used() {
        let table = BoundedTable::with_max_entries(2);
        table.insert(1u32, 10u64);
        table.insert(2, 20);
        assert_eq!(table.get(&1), Some(10));
        table.insert(3, 30);

        assert_eq!(table.len(), 2);
        assert_eq!(table.peek(&2), None);
        assert_eq!(table.peek(&1), Some(10));
        assert_eq!(table.peek(&3), Some(30));
    }

    #[test]
    fn last_writer_wins() {
        let table = BoundedTable::with_max_entries(4);
        table.insert("k", 1u8);
        table.insert("k", 2);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&"k"), Some(2));
    }

    #[test]
    fn delete_is_idempotent() {
        let table = BoundedTable::with_max_entries(4);
        table.insert(5u32, 1u8);
        assert_eq!(table.delete(&5), Some(1));
        assert_eq!(table.delete(&5), None);
        assert!(table.is_empty());
    }
}
