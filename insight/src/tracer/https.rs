use insight_common::config::ScopeConfig;
use insight_common::event::{HttpsEvent, PayloadKind};
use insight_common::probe::https::HttpsProbe;
use insight_common::MAX_ENTRIES;

use crate::channel::{PerfChannel, PerfSink};
use crate::scratch::ScratchPool;
use crate::table::BoundedTable;
use crate::task::{HostMemory, HostTask};
use crate::tracer::{run, PERF_QUEUE_DEPTH};

/// Stands for the uprobes on the TLS library's `SSL_write` and `SSL_read`.
pub struct HttpsTracer {
    config: ScopeConfig,
    buffers: BoundedTable<u32, u64>,
    scratch: ScratchPool<HttpsEvent>,
    events: PerfChannel<HttpsEvent>,
}

impl HttpsTracer {
    pub fn new(config: ScopeConfig, cpus: usize) -> Self {
        Self {
            config,
            buffers: BoundedTable::with_max_entries(MAX_ENTRIES),
            scratch: ScratchPool::new(cpus),
            events: PerfChannel::new(cpus, PERF_QUEUE_DEPTH),
        }
    }

    pub fn events(&self) -> &PerfChannel<HttpsEvent> {
        &self.events
    }

    pub fn in_flight(&self) -> usize {
        self.buffers.len()
    }

    fn probe(&self, cpu: usize) -> HttpsProbe<'_, BoundedTable<u32, u64>, PerfSink<'_, HttpsEvent>> {
        HttpsProbe {
            config: &self.config,
            buffers: &self.buffers,
            events: PerfSink::new(cpu, &self.scratch, &self.events),
        }
    }

    pub fn ssl_write(&self, task: &HostTask, buf: u64) -> u32 {
        run("ssl_write", self.probe(task.cpu).on_enter(task, buf))
    }

    pub fn ssl_write_ret(&self, task: &HostTask, memory: &HostMemory, ret: i64) -> u32 {
        run(
            "ssl_write_ret",
            self.probe(task.cpu)
                .on_exit(task, memory, PayloadKind::Request, ret),
        )
    }

    pub fn ssl_read(&self, task: &HostTask, buf: u64) -> u32 {
        run("ssl_read", self.probe(task.cpu).on_enter(task, buf))
    }

    pub fn ssl_read_ret(&self, task: &HostTask, memory: &HostMemory, ret: i64) -> u32 {
        run(
            "ssl_read_ret",
            self.probe(task.cpu)
                .on_exit(task, memory, PayloadKind::Response, ret),
        )
    }
}
