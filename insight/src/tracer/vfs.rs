use insight_common::config::ScopeConfig;
use insight_common::event::{FileOp, PathEntry, VfsEvent};
use insight_common::probe::vfs::VfsProbe;
use insight_common::PATH_CACHE_ENTRIES;

use crate::channel::{RingChannel, RingSink};
use crate::table::BoundedTable;
use crate::task::{HostFile, HostTask};
use crate::tracer::{run, VFS_RING_SIZE};

/// Regular-file reads and writes, emitted through a ring.
pub struct VfsTracer {
    config: ScopeConfig,
    paths: BoundedTable<u64, PathEntry>,
    events: RingChannel<VfsEvent>,
}

impl VfsTracer {
    pub fn new(config: ScopeConfig) -> Self {
        Self::with_ring_size(config, VFS_RING_SIZE)
    }

    pub fn with_ring_size(config: ScopeConfig, ring_size: usize) -> Self {
        Self {
            config,
            paths: BoundedTable::with_max_entries(PATH_CACHE_ENTRIES),
            events: RingChannel::with_byte_size(ring_size),
        }
    }

    pub fn events(&self) -> &RingChannel<VfsEvent> {
        &self.events
    }

    pub fn cached_paths(&self) -> usize {
        self.paths.len()
    }

    fn probe(&self) -> VfsProbe<'_, BoundedTable<u64, PathEntry>, RingSink<'_, VfsEvent>> {
        VfsProbe {
            config: &self.config,
            paths: &self.paths,
            events: RingSink(&self.events),
        }
    }

    /// The `file_open` security hook. It only observes; the open is always allowed.
    pub fn file_open(&self, file: &HostFile) -> u32 {
        let _ = run("file_open", self.probe().on_open(file));
        0
    }

    pub fn vfs_read(&self, task: &HostTask, file: &HostFile, ret: i64) -> u32 {
        run("vfs_read", self.probe().on_exit(task, file, FileOp::Read, ret))
    }

    pub fn vfs_write(&self, task: &HostTask, file: &HostFile, ret: i64) -> u32 {
        run("vfs_write", self.probe().on_exit(task, file, FileOp::Write, ret))
    }
}
