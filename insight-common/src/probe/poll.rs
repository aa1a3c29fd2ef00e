//! Readiness of IPv4 sockets: a `connect` registers the descriptor, a later `poll` or
//! `ppoll` on it is reported together with the peer it was connected to.

use crate::config::ScopeConfig;
use crate::event::PollEvent;
use crate::pipeline::{
    task_in_scope, CorrelationTable, CurrentTask, EventSink, EventSlot, UserMemory,
};
use crate::probe::read_sockaddr_in;
use crate::InsightError;
use crate::InsightError::OutOfSpace;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketArgs {
    pub fd: i32,
    /// Network byte order.
    pub sin_addr: u32,
    /// Host byte order.
    pub sin_port: u32,
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for SocketArgs {}

pub struct PollProbe<'a, F, A, S> {
    pub config: &'a ScopeConfig,
    pub fds: &'a F,
    pub args: &'a A,
    pub events: S,
}

impl<F, A, S> PollProbe<'_, F, A, S>
where
    F: CorrelationTable<i32, SocketArgs>,
    A: CorrelationTable<u32, SocketArgs>,
    S: EventSink<PollEvent>,
{
    pub fn on_connect<T, M>(
        &self,
        task: &T,
        memory: &M,
        fd: i32,
        uaddr: u64,
    ) -> Result<u32, InsightError>
    where
        T: CurrentTask,
        M: UserMemory,
    {
        if !task_in_scope(task, self.config.tgid)? {
            return Ok(0);
        }
        if let Some(peer) = read_sockaddr_in(memory, uaddr)? {
            let socket = SocketArgs {
                fd,
                sin_addr: peer.addr,
                sin_port: peer.port as u32,
            };
            self.fds.record(&fd, &socket)?;
        }
        Ok(0)
    }

    /// `ufds` points at the caller's `pollfd` array; only its first entry is inspected.
    pub fn on_poll_enter<T, M>(&self, task: &T, memory: &M, ufds: u64) -> Result<u32, InsightError>
    where
        T: CurrentTask,
        M: UserMemory,
    {
        if !task_in_scope(task, self.config.tgid)? {
            return Ok(0);
        }
        let mut fd = [0u8; 4];
        memory.read_user(ufds, &mut fd)?;
        let Some(socket) = self.fds.lookup(&i32::from_ne_bytes(fd)) else {
            return Ok(0);
        };
        self.args.record(&task.pid()?, &socket)?;
        Ok(0)
    }

    pub fn on_poll_exit<T: CurrentTask>(&self, task: &T, ret: i64) -> Result<u32, InsightError> {
        let Some(socket) = self.args.take(task.pid()?) else {
            return Ok(0);
        };
        if ret < 0 {
            return Ok(0);
        }

        let mut event = self.events.reserve().ok_or(OutOfSpace("poll event"))?;
        event.tgid = task.tgid()?;
        event.pid = task.pid()?;
        event.uid = task.uid();
        event.fd = socket.fd;
        event.sin_addr = socket.sin_addr;
        event.sin_port = socket.sin_port;
        event.ret = ret as i32;
        event.commit();
        Ok(0)
    }

    pub fn on_close(&self, fd: i32) -> Result<u32, InsightError> {
        self.fds.remove(&fd);
        Ok(0)
    }
}
