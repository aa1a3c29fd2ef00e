use crate::config::ScopeConfig;
use crate::event::{HttpsEvent, PayloadKind};
use crate::pipeline::{
    capture_len, task_in_scope, CorrelationTable, CurrentTask, EventSink, EventSlot, UserMemory,
};
use crate::InsightError::OutOfSpace;
use crate::{InsightError, MAX_DATA_SIZE};

/// Decrypted payloads seen at `SSL_write` (requests) and `SSL_read` (responses).
pub struct HttpsProbe<'a, A, S> {
    pub config: &'a ScopeConfig,
    /// The caller's plaintext buffer, keyed by thread id.
    pub buffers: &'a A,
    pub events: S,
}

impl<A, S> HttpsProbe<'_, A, S>
where
    A: CorrelationTable<u32, u64>,
    S: EventSink<HttpsEvent>,
{
    pub fn on_enter<T: CurrentTask>(&self, task: &T, buf: u64) -> Result<u32, InsightError> {
        if !task_in_scope(task, self.config.tgid)? {
            return Ok(0);
        }
        self.buffers.record(&task.pid()?, &buf)?;
        Ok(0)
    }

    /// `ret` is the library's return value: bytes transferred, or a non-positive
    /// error indication.
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
        let Some(buf) = self.buffers.take(task.pid()?) else {
            return Ok(0);
        };
        if ret <= 0 {
            return Ok(0);
        }

        let mut event = self.events.reserve().ok_or(OutOfSpace("https event"))?;
        let len = capture_len(ret as usize, MAX_DATA_SIZE);
        memory.read_user(*buf, &mut event.buf[..len])?;
        event.tgid = task.tgid()?;
        event.pid = task.pid()?;
        event.uid = task.uid();
        event.len = ret as u32;
        event.kind = kind as u32;
        event.commit();
        Ok(0)
    }
}
