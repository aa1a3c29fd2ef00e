use crate::config::ScopeConfig;
use crate::event::{HttpEvent, PayloadKind};
use crate::pipeline::{
    capture_len, task_in_scope, CorrelationTable, CurrentTask, EventSink, EventSlot, UserMemory,
};
use crate::probe::SyscallArgs;
use crate::InsightError::OutOfSpace;
use crate::{InsightError, MAX_DATA_SIZE};

/// Plaintext payloads of `sendto` (requests) and `recvfrom` (responses).
pub struct HttpProbe<'a, A, S> {
    pub config: &'a ScopeConfig,
    pub args: &'a A,
    pub events: S,
}

impl<A, S> HttpProbe<'_, A, S>
where
    A: CorrelationTable<u32, SyscallArgs>,
    S: EventSink<HttpEvent>,
{
    pub fn on_enter<T: CurrentTask>(&self, task: &T, args: SyscallArgs) -> Result<u32, InsightError> {
        if !task_in_scope(task, self.config.tgid)? {
            return Ok(0);
        }
        self.args.record(&task.pid()?, &args)?;
        Ok(0)
    }

    pub fn on_exit<T, M>(
        &self,
        task: &T,
        memory: &M,
        kind: PayloadKind,
        ret: i64,
    ) -> Result<u32, InsightError>
    where
        T: CurrentTask,
        M: UserMemory,
    {
        let Some(args) = self.args.take(task.pid()?) else {
            return Ok(0);
        };
        if ret <= 0 {
            return Ok(0);
        }

        let mut event = self.events.reserve().ok_or(OutOfSpace("http event"))?;
        let len = capture_len(ret as usize, MAX_DATA_SIZE);
        memory.read_user(args.buf, &mut event.buf[..len])?;
        event.tgid = task.tgid()?;
        event.pid = task.pid()?;
        event.uid = task.uid();
        event.len = len as u32;
        event.kind = kind as u32;
        event.commit();
        Ok(0)
    }
}
