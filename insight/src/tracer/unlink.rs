use insight_common::config::UnlinkConfig;
use insight_common::event::UnlinkEvent;
use insight_common::probe::unlink::UnlinkProbe;
use insight_common::MAX_ENTRIES;

use crate::channel::{PerfChannel, PerfSink};
use crate::scratch::ScratchPool;
use crate::table::BoundedTable;
use crate::task::{ForcedReturn, HostMemory, HostTask};
use crate::tracer::{run, PERF_QUEUE_DEPTH};

/// The delayed-unlink interceptor.
///
/// `sys_unlink`/`sys_unlinkat` stand for the kprobes on the syscall functions: when they
/// intercept, `regs` holds the forced return value and the deletion must not happen.
pub struct UnlinkTracer {
    config: UnlinkConfig,
    args: BoundedTable<u32, u64>,
    scratch: ScratchPool<UnlinkEvent>,
    events: PerfChannel<UnlinkEvent>,
}

impl UnlinkTracer {
    pub fn new(config: UnlinkConfig, cpus: usize) -> Self {
        Self {
            config,
            args: BoundedTable::with_max_entries(MAX_ENTRIES),
            scratch: ScratchPool::new(cpus),
            events: PerfChannel::new(cpus, PERF_QUEUE_DEPTH),
        }
    }

    pub fn events(&self) -> &PerfChannel<UnlinkEvent> {
        &self.events
    }

    fn probe(&self, cpu: usize) -> UnlinkProbe<'_, BoundedTable<u32, u64>, PerfSink<'_, UnlinkEvent>> {
        UnlinkProbe {
            config: &self.config,
            args: &self.args,
            events: PerfSink::new(cpu, &self.scratch, &self.events),
        }
    }

    pub fn sys_enter_unlink(&self, task: &HostTask, pathname: u64) -> u32 {
        run(
            "sys_enter_unlink",
            self.probe(task.cpu).on_unlink_enter(task, pathname),
        )
    }

    pub fn sys_enter_unlinkat(&self, task: &HostTask, pathname: u64, flags: i64) -> u32 {
        run(
            "sys_enter_unlinkat",
            self.probe(task.cpu).on_unlinkat_enter(task, pathname, flags),
        )
    }

    pub fn sys_unlink(&self, task: &HostTask, memory: &HostMemory, regs: &ForcedReturn) -> u32 {
        run(
            "sys_unlink",
            self.probe(task.cpu).on_intercept(task, memory, regs),
        )
    }

    pub fn sys_unlinkat(&self, task: &HostTask, memory: &HostMemory, regs: &ForcedReturn) -> u32 {
        run(
            "sys_unlinkat",
            self.probe(task.cpu).on_intercept(task, memory, regs),
        )
    }
}
