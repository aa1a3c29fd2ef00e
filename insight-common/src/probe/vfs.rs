//! Reads and writes of regular files.
//!
//! The read/write exit hooks cannot resolve a full path, so they consult a cache filled
//! by the file-open hook. A cached path is subject to [`should_filter_path`]; a miss
//! reports the basename and skips path filtering.

use crate::config::ScopeConfig;
use crate::event::{FileOp, PathEntry, VfsEvent};
use crate::filter::should_filter_path;
use crate::pipeline::{
    task_in_scope, CurrentTask, EventSink, EventSlot, OpenFile, PathCache, ResolvePath,
};
use crate::InsightError::OutOfSpace;
use crate::{InsightError, FILENAME_LEN};

pub struct VfsProbe<'a, P, S> {
    pub config: &'a ScopeConfig,
    pub paths: &'a P,
    pub events: S,
}

impl<P, S> VfsProbe<'_, P, S>
where
    P: PathCache,
    S: EventSink<VfsEvent>,
{
    pub fn on_open<F: ResolvePath>(&self, file: &F) -> Result<u32, InsightError> {
        let mut entry = PathEntry::empty();
        file.resolve_path(&mut entry.filename)?;
        self.paths.insert(file.identity(), &entry)?;
        Ok(0)
    }

    pub fn on_exit<T, F>(&self, task: &T, file: &F, op: FileOp, ret: i64) -> Result<u32, InsightError>
    where
        T: CurrentTask,
        F: OpenFile,
    {
        if !file.is_regular()? {
            return Ok(0);
        }
        if !task_in_scope(task, self.config.tgid)? {
            return Ok(0);
        }

        let mut event = self.events.reserve().ok_or(OutOfSpace("vfs event"))?;
        event.tgid = task.tgid()?;
        event.pid = task.pid()?;
        event.uid = task.uid();
        event.ts = task.ktime_ns();
        event.size = if ret >= 0 { ret as u64 } else { 0 };
        event.ret = ret;
        event.op = op as u8;
        event.comm = task.comm()?;

        if self.paths.copy_into(file.identity(), &mut event.filename) {
            event.filename[FILENAME_LEN - 1] = 0;
            if should_filter_path(&event.filename) {
                event.discard();
                return Ok(0);
            }
        } else {
            file.read_basename(&mut event.filename)?;
        }

        event.commit();
        Ok(0)
    }
}
