//! Delayed-unlink interceptor.
//!
//! The syscall entry tracepoints remember the path argument; the kprobe on the syscall
//! itself decides whether to intercept. An intercepted deletion returns 0 to the caller
//! without the file being removed, and an [`UnlinkEvent`] is emitted in its place.
//! Nothing ever performs the deletion later.

use crate::config::UnlinkConfig;
use crate::event::UnlinkEvent;
use crate::filter::{filter_directory, is_own_process};
use crate::pipeline::{
    CorrelationTable, CurrentTask, EventSink, EventSlot, ReturnOverride, UserMemory,
};
use crate::InsightError::OutOfSpace;
use crate::{InsightError, AT_REMOVEDIR};

pub struct UnlinkProbe<'a, A, S> {
    pub config: &'a UnlinkConfig,
    /// User pointer to the pathname, keyed by thread id.
    pub args: &'a A,
    pub events: S,
}

impl<A, S> UnlinkProbe<'_, A, S>
where
    A: CorrelationTable<u32, u64>,
    S: EventSink<UnlinkEvent>,
{
    pub fn on_unlink_enter<T: CurrentTask>(
        &self,
        task: &T,
        pathname: u64,
    ) -> Result<u32, InsightError> {
        if is_own_process(task.tgid()?, task.parent_tgid()?, self.config.this) {
            return Ok(0);
        }
        self.args.record(&task.pid()?, &pathname)?;
        Ok(0)
    }

    /// Directory removals are never intercepted.
    pub fn on_unlinkat_enter<T: CurrentTask>(
        &self,
        task: &T,
        pathname: u64,
        flags: i64,
    ) -> Result<u32, InsightError> {
        if flags & AT_REMOVEDIR != 0 {
            return Ok(0);
        }
        self.on_unlink_enter(task, pathname)
    }

    pub fn on_intercept<T, M, O>(
        &self,
        task: &T,
        memory: &M,
        regs: &O,
    ) -> Result<u32, InsightError>
    where
        T: CurrentTask,
        M: UserMemory,
        O: ReturnOverride,
    {
        let Some(pathname) = self.args.take(task.pid()?) else {
            return Ok(0);
        };

        let mut event = self.events.reserve().ok_or(OutOfSpace("unlink event"))?;
        event.tgid = task.tgid()?;
        event.pid = task.pid()?;
        event.uid = task.uid();
        event.pathname[0] = 0;
        memory.read_user_str(*pathname, &mut event.pathname)?;

        if !filter_directory(self.config, &event.pathname) {
            event.discard();
            return Ok(0);
        }

        regs.override_return(0);
        event.commit();
        Ok(0)
    }
}
