use insight_common::config::ConnectConfig;
use insight_common::event::{ConnectEvent, Protocol};
use insight_common::probe::connect::ConnectProbe;
use insight_common::MAX_ENTRIES;

use crate::channel::{PerfChannel, PerfSink};
use crate::scratch::ScratchPool;
use crate::table::BoundedTable;
use crate::task::{HostSockets, HostTask};
use crate::tracer::{run, PERF_QUEUE_DEPTH};

pub struct ConnectTracer {
    config: ConnectConfig,
    sockets: BoundedTable<u32, u64>,
    scratch: ScratchPool<ConnectEvent>,
    events: PerfChannel<ConnectEvent>,
}

impl ConnectTracer {
    pub fn new(config: ConnectConfig, cpus: usize) -> Self {
        Self {
            config,
            sockets: BoundedTable::with_max_entries(MAX_ENTRIES),
            scratch: ScratchPool::new(cpus),
            events: PerfChannel::new(cpus, PERF_QUEUE_DEPTH),
        }
    }

    pub fn events(&self) -> &PerfChannel<ConnectEvent> {
        &self.events
    }

    /// Connects in flight.
    pub fn pending(&self) -> usize {
        self.sockets.len()
    }

    fn probe(&self, cpu: usize) -> ConnectProbe<'_, BoundedTable<u32, u64>, PerfSink<'_, ConnectEvent>> {
        ConnectProbe {
            config: &self.config,
            sockets: &self.sockets,
            events: PerfSink::new(cpu, &self.scratch, &self.events),
        }
    }

    fn enter(&self, task: &HostTask, sock: u64, program: &'static str) -> u32 {
        run(program, self.probe(task.cpu).on_enter(task, sock))
    }

    fn exit(
        &self,
        task: &HostTask,
        sockets: &HostSockets,
        protocol: Protocol,
        ret: i64,
        program: &'static str,
    ) -> u32 {
        run(program, self.probe(task.cpu).on_exit(task, sockets, protocol, ret))
    }

    pub fn tcp_v4_connect(&self, task: &HostTask, sock: u64) -> u32 {
        self.enter(task, sock, "tcp_v4_connect")
    }

    pub fn tcp_v4_connect_ret(&self, task: &HostTask, sockets: &HostSockets, ret: i64) -> u32 {
        self.exit(task, sockets, Protocol::Ipv4, ret, "tcp_v4_connect_ret")
    }

    pub fn tcp_v6_connect(&self, task: &HostTask, sock: u64) -> u32 {
        self.enter(task, sock, "tcp_v6_connect")
    }

    pub fn tcp_v6_connect_ret(&self, task: &HostTask, sockets: &HostSockets, ret: i64) -> u32 {
        self.exit(task, sockets, Protocol::Ipv6, ret, "tcp_v6_connect_ret")
    }
}
