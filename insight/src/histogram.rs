use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use insight_common::event::CpuHistogram;
use insight_common::pipeline::HistogramTable;
use insight_common::{InsightError, MAX_SLOTS, TASK_COMM_LEN};

struct Entry {
    counts: [AtomicU32; MAX_SLOTS],
    comm: [u8; TASK_COMM_LEN],
}

/// Per thread-group histograms whose buckets are bumped with atomic adds, so concurrent
/// workers never lose an increment.
pub struct Histograms {
    capacity: usize,
    entries: RwLock<HashMap<u32, Arc<Entry>>>,
}

impl Histograms {
    pub fn with_max_entries(capacity: u32) -> Self {
        Self {
            capacity: capacity as usize,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn entry(&self, tgid: u32) -> Option<Arc<Entry>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&tgid)
            .cloned()
    }

    pub fn get(&self, tgid: u32) -> Option<CpuHistogram> {
        let entry = self.entry(tgid)?;
        let mut histogram = CpuHistogram::new(entry.comm);
        for (out, count) in histogram.histogram.iter_mut().zip(&entry.counts) {
            *out = count.load(Ordering::Relaxed);
        }
        Some(histogram)
    }

    pub fn tgids(&self) -> Vec<u32> {
        let mut tgids: Vec<u32> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        tgids.sort_unstable();
        tgids
    }
}

impl HistogramTable for Histograms {
    fn increment<F>(&self, tgid: u32, slot: usize, comm: F) -> Result<(), InsightError>
    where
        F: FnOnce() -> Result<[u8; TASK_COMM_LEN], InsightError>,
    {
        let slot = slot.min(MAX_SLOTS - 1);
        let entry = match self.entry(tgid) {
            Some(entry) => entry,
            None => {
                let comm = comm()?;
                let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
                if entries.len() >= self.capacity && !entries.contains_key(&tgid) {
                    return Err(InsightError::OutOfSpace("cpu histograms"));
                }
                entries
                    .entry(tgid)
                    .or_insert_with(|| {
                        Arc::new(Entry {
                            counts: std::array::from_fn(|_| AtomicU32::new(0)),
                            comm,
                        })
                    })
                    .clone()
            }
        };
        entry.counts[slot].fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn first_increment_names_the_histogram() {
        let histograms = Histograms::with_max_entries(4);
        histograms.increment(7, 3, || Ok(*b"worker\0\0\0\0\0\0\0\0\0\0")).unwrap();
        histograms
            .increment(7, 3, || Err(InsightError::Unreachable("name is only read once")))
            .unwrap();

        let histogram = histograms.get(7).unwrap();
        assert_eq!(histogram.histogram[3], 2);
        assert_eq!(&histogram.comm[..6], b"worker");
    }

    #[test]
    fn full_table_refuses_new_groups() {
        let histograms = Histograms::with_max_entries(1);
        histograms.increment(1, 0, || Ok([0; 16])).unwrap();
        assert_eq!(
            histograms.increment(2, 0, || Ok([0; 16])),
            Err(InsightError::OutOfSpace("cpu histograms"))
        );
        assert_eq!(histograms.tgids(), vec![1]);
    }
}
