use insight_common::config::ScopeConfig;
use insight_common::event::PollEvent;
use insight_common::probe::poll::{PollProbe, SocketArgs};
use insight_common::MAX_ENTRIES;

use crate::channel::{PerfChannel, PerfSink};
use crate::scratch::ScratchPool;
use crate::table::BoundedTable;
use crate::task::{HostMemory, HostTask};
use crate::tracer::{run, PERF_QUEUE_DEPTH};

type Probe<'a> = PollProbe<
    'a,
    BoundedTable<i32, SocketArgs>,
    BoundedTable<u32, SocketArgs>,
    PerfSink<'a, PollEvent>,
>;

pub struct PollTracer {
    config: ScopeConfig,
    fds: BoundedTable<i32, SocketArgs>,
    args: BoundedTable<u32, SocketArgs>,
    scratch: ScratchPool<PollEvent>,
    events: PerfChannel<PollEvent>,
}

impl PollTracer {
    pub fn new(config: ScopeConfig, cpus: usize) -> Self {
        Self {
            config,
            fds: BoundedTable::with_max_entries(MAX_ENTRIES),
            args: BoundedTable::with_max_entries(MAX_ENTRIES),
            scratch: ScratchPool::new(cpus),
            events: PerfChannel::new(cpus, PERF_QUEUE_DEPTH),
        }
    }

    pub fn events(&self) -> &PerfChannel<PollEvent> {
        &self.events
    }

    /// The peer a descriptor was connected to, if it is tracked.
    pub fn socket(&self, fd: i32) -> Option<SocketArgs> {
        self.fds.peek(&fd)
    }

    fn probe(&self, cpu: usize) -> Probe<'_> {
        PollProbe {
            config: &self.config,
            fds: &self.fds,
            args: &self.args,
            events: PerfSink::new(cpu, &self.scratch, &self.events),
        }
    }

    pub fn sys_enter_connect(&self, task: &HostTask, memory: &HostMemory, fd: i32, uaddr: u64) -> u32 {
        run(
            "sys_enter_connect",
            self.probe(task.cpu).on_connect(task, memory, fd, uaddr),
        )
    }

    pub fn sys_enter_poll(&self, task: &HostTask, memory: &HostMemory, ufds: u64) -> u32 {
        run(
            "sys_enter_poll",
            self.probe(task.cpu).on_poll_enter(task, memory, ufds),
        )
    }

    pub fn sys_exit_poll(&self, task: &HostTask, ret: i64) -> u32 {
        run("sys_exit_poll", self.probe(task.cpu).on_poll_exit(task, ret))
    }

    pub fn sys_enter_ppoll(&self, task: &HostTask, memory: &HostMemory, ufds: u64) -> u32 {
        run(
            "sys_enter_ppoll",
            self.probe(task.cpu).on_poll_enter(task, memory, ufds),
        )
    }

    pub fn sys_exit_ppoll(&self, task: &HostTask, ret: i64) -> u32 {
        run("sys_exit_ppoll", self.probe(task.cpu).on_poll_exit(task, ret))
    }

    pub fn sys_enter_close(&self, task: &HostTask, fd: i32) -> u32 {
        run("sys_enter_close", self.probe(task.cpu).on_close(fd))
    }
}
