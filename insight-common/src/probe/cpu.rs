//! On-CPU slice durations, bucketed per thread group.

use crate::config::ScopeConfig;
use crate::histogram::log2_slot;
use crate::pipeline::{task_in_scope, CorrelationTable, CurrentTask, HistogramTable, TaskInfo};
use crate::InsightError;

const NS_PER_MS: u64 = 1_000_000;

pub struct CpuProbe<'a, A, H> {
    pub config: &'a ScopeConfig,
    /// When each thread was last switched in, keyed by thread id.
    pub starts: &'a A,
    pub histograms: &'a H,
}

impl<A, H> CpuProbe<'_, A, H>
where
    A: CorrelationTable<u32, u64>,
    H: HistogramTable,
{
    /// Called once per context switch, on the incoming task, with the outgoing one.
    ///
    /// The outgoing task is accounted even when the incoming one could not be recorded;
    /// that failure is reported afterwards.
    pub fn on_switch<C, P>(&self, current: &C, prev: &P) -> Result<u32, InsightError>
    where
        C: CurrentTask,
        P: TaskInfo,
    {
        let now = current.ktime_ns();

        let started = if task_in_scope(current, self.config.tgid)? {
            self.starts.record(&current.pid()?, &now)
        } else {
            Ok(())
        };

        self.account(prev, now)?;
        started.map(|()| 0)
    }

    fn account<P: TaskInfo>(&self, prev: &P, now: u64) -> Result<(), InsightError> {
        if !task_in_scope(prev, self.config.tgid)? {
            return Ok(());
        }
        let Some(start) = self.starts.take(prev.pid()?) else {
            return Ok(());
        };
        if now <= *start {
            return Ok(());
        }

        let slot = log2_slot((now - *start) / NS_PER_MS);
        self.histograms
            .increment(prev.tgid()?, slot, || prev.comm())
    }
}
