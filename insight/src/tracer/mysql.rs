use insight_common::config::MysqlConfig;
use insight_common::event::{Direction, MysqlEvent};
use insight_common::mysql::ConnectionInfo;
use insight_common::probe::mysql::MysqlProbe;
use insight_common::probe::SyscallArgs;
use insight_common::MAX_ENTRIES;
use log::trace;

use crate::channel::{PerfChannel, PerfSink};
use crate::scratch::ScratchPool;
use crate::table::BoundedTable;
use crate::task::{HostMemory, HostTask};
use crate::tracer::{run, PERF_QUEUE_DEPTH};

type Probe<'a> = MysqlProbe<
    'a,
    BoundedTable<i32, ConnectionInfo>,
    BoundedTable<u32, SyscallArgs>,
    PerfSink<'a, MysqlEvent>,
>;

pub struct MysqlTracer {
    config: MysqlConfig,
    connections: BoundedTable<i32, ConnectionInfo>,
    args: BoundedTable<u32, SyscallArgs>,
    scratch: ScratchPool<MysqlEvent>,
    events: PerfChannel<MysqlEvent>,
}

impl MysqlTracer {
    pub fn new(config: MysqlConfig, cpus: usize) -> Self {
        Self {
            config,
            connections: BoundedTable::with_max_entries(MAX_ENTRIES),
            args: BoundedTable::with_max_entries(MAX_ENTRIES),
            scratch: ScratchPool::new(cpus),
            events: PerfChannel::new(cpus, PERF_QUEUE_DEPTH),
        }
    }

    pub fn events(&self) -> &PerfChannel<MysqlEvent> {
        &self.events
    }

    /// Classification state of a descriptor, without touching its recency.
    pub fn connection(&self, fd: i32) -> Option<ConnectionInfo> {
        self.connections.peek(&fd)
    }

    fn probe(&self, cpu: usize) -> Probe<'_> {
        MysqlProbe {
            config: &self.config,
            connections: &self.connections,
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
                .on_exit(task, memory, Direction::ClientToServer, ret),
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
                .on_exit(task, memory, Direction::ServerToClient, ret),
        )
    }

    pub fn sys_enter_close(&self, task: &HostTask, fd: i32) -> u32 {
        if let Some(conn) = self.connections.peek(&fd) {
            let state: &'static str = conn.state().into();
            trace!("fd {fd} closed in state {state}");
        }
        run("sys_enter_close", self.probe(task.cpu).on_close(fd))
    }
}
