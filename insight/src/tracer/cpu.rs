use insight_common::config::ScopeConfig;
use insight_common::event::CpuHistogram;
use insight_common::probe::cpu::CpuProbe;
use insight_common::CPU_MAX_ENTRIES;

use crate::histogram::Histograms;
use crate::table::BoundedTable;
use crate::task::HostTask;
use crate::tracer::run;

pub struct CpuTracer {
    config: ScopeConfig,
    starts: BoundedTable<u32, u64>,
    histograms: Histograms,
}

impl CpuTracer {
    pub fn new(config: ScopeConfig) -> Self {
        Self {
            config,
            starts: BoundedTable::with_max_entries(CPU_MAX_ENTRIES),
            histograms: Histograms::with_max_entries(CPU_MAX_ENTRIES),
        }
    }

    pub fn histogram(&self, tgid: u32) -> Option<CpuHistogram> {
        self.histograms.get(tgid)
    }

    pub fn tgids(&self) -> Vec<u32> {
        self.histograms.tgids()
    }

    /// `next` is switched in, `prev` is switched out; `next.now_ns` is the switch time.
    pub fn finish_task_switch(&self, next: &HostTask, prev: &HostTask) -> u32 {
        let probe = CpuProbe {
            config: &self.config,
            starts: &self.starts,
            histograms: &self.histograms,
        };
        run("finish_task_switch", probe.on_switch(next, prev))
    }
}
