use insight_common::config::ScopeConfig;
use insight_common::event::{HttpEvent, PayloadKind};
use insight_common::probe::http::HttpProbe;
use insight_common::probe::SyscallArgs;
use insight_common::MAX_ENTRIES;

use crate::channel::{PerfChannel, PerfSink};
use crate::scratch::ScratchPool;
use crate::table::BoundedTable;
use crate::task::{HostMemory, HostTask};
use crate::tracer::{run, PERF_QUEUE_DEPTH};

pub struct HttpTracer {
    config: ScopeConfig,
    args: BoundedTable<u32, SyscallArgs>,
    scratch: ScratchPool<HttpEvent>,
    events: PerfChannel<HttpEvent>,
}

impl HttpTracer {
    pub fn new(config: ScopeConfig, cpus: usize) -> Self {
        Self {
            config,
            args: BoundedTable::with_max_entries(MAX_ENTRIES),
            scratch: ScratchPool::new(cpus),
            events: PerfChannel::new(cpus, PERF_QUEUE_DEPTH),
        }
    }

    pub fn events(&self) -> &PerfChannel<HttpEvent> {
        &self.events
    }

    /// Calls that entered and have not returned yet.
    pub fn in_flight(&self) -> usize {
        self.args.len()
    }

    fn probe(&self, cpu: usize) -> HttpProbe<'_, BoundedTable<u32, SyscallArgs>, PerfSink<'_, HttpEvent>> {
        HttpProbe {
            config: &self.config,
            args: &self.args,
            events: PerfSink::new(cpu, &self.scratch, &self.events),
        }
    }

    pub fn sys_enter_sendto(&self, task: &HostTask, fd: i32, buf: u64, len: u64) -> u32 {
        run(
            "sys_enter_sendto",
            self.probe(task.cpu)
                .on_enter(task, SyscallArgs::new(fd, buf, len)),
        )
    }

    pub fn sys_exit_sendto(&self, task: &HostTask, memory: &HostMemory, ret: i64) -> u32 {
        run(
            "sys_exit_sendto",
            self.probe(task.cpu)
                .on_exit(task, memory, PayloadKind::Request, ret),
        )
    }

    pub fn sys_enter_recvfrom(&self, task: &HostTask, fd: i32, buf: u64, len: u64) -> u32 {
        run(
            "sys_enter_recvfrom",
            self.probe(task.cpu)
                .on_enter(task, SyscallArgs::new(fd, buf, len)),
        )
    }

    pub fn sys_exit_recvfrom(&self, task: &HostTask, memory: &HostMemory, ret: i64) -> u32 {
        run(
            "sys_exit_recvfrom",
            self.probe(task.cpu)
                .on_exit(task, memory, PayloadKind::Response, ret),
        )
    }
}
