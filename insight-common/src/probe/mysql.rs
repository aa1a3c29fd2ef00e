//! MySQL wire traffic.
//!
//! A connect to the MySQL port creates a [`ConnectionInfo`] for the descriptor. Every
//! `sendto`/`recvfrom` on a tracked descriptor is captured, fed through the
//! connection's state machine and emitted unless the connection turned out not to be
//! MySQL.

use crate::config::MysqlConfig;
use crate::event::{Direction, MysqlEvent};
use crate::mysql::{ConnState, ConnectionInfo, Observation};
use crate::pipeline::{
    capture_len, task_in_scope, CorrelationTable, CurrentTask, EventSink, EventSlot, UserMemory,
};
use crate::probe::{read_sockaddr_in, SyscallArgs};
use crate::InsightError::OutOfSpace;
use crate::{InsightError, MAX_DATA_SIZE};

pub struct MysqlProbe<'a, C, A, S> {
    pub config: &'a MysqlConfig,
    /// Classification state keyed by file descriptor.
    pub connections: &'a C,
    /// Arguments of the in-flight send or receive, keyed by thread id.
    pub args: &'a A,
    pub events: S,
}

impl<C, A, S> MysqlProbe<'_, C, A, S>
where
    C: CorrelationTable<i32, ConnectionInfo>,
    A: CorrelationTable<u32, SyscallArgs>,
    S: EventSink<MysqlEvent>,
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
        let Some(peer) = read_sockaddr_in(memory, uaddr)? else {
            return Ok(0);
        };
        if self.config.tracks_port(peer.port) {
            self.connections
                .record(&fd, &ConnectionInfo::connecting(fd, peer.port))?;
        }
        Ok(0)
    }

    /// Descriptors are per process, so a tracked fd number only means something inside
    /// the traced scope.
    pub fn on_enter<T: CurrentTask>(&self, task: &T, args: SyscallArgs) -> Result<u32, InsightError> {
        if !task_in_scope(task, self.config.tgid)? {
            return Ok(0);
        }
        if self.connections.lookup(&args.fd).is_none() {
            return Ok(0);
        }
        self.args.record(&task.pid()?, &args)?;
        Ok(0)
    }

    pub fn on_exit<T, M>(
        &self,
        task: &T,
        memory: &M,
        direction: Direction,
        ret: i64,
    ) -> Result<u32, InsightError>
    where
        T: CurrentTask,
        M: UserMemory,
    {
        let Some(args) = self.args.take(task.pid()?) else {
            return Ok(0);
        };
        if ret <= 0 || !task_in_scope(task, self.config.tgid)? {
            return Ok(0);
        }
        let Some(mut conn) = self.connections.lookup(&args.fd) else {
            return Ok(0);
        };
        if conn.state() == ConnState::Invalid {
            return Ok(0);
        }

        let mut event = self.events.reserve().ok_or(OutOfSpace("mysql event"))?;
        let len = capture_len(ret as usize, MAX_DATA_SIZE);
        memory.read_user(args.buf, &mut event.buf[..len])?;

        let before = conn;
        let observation = conn.observe(&event.buf[..len], direction);
        if conn != before {
            self.connections.record(&args.fd, &conn)?;
        }

        let Observation::Emit { sequence_id } = observation else {
            event.discard();
            return Ok(0);
        };
        event.tgid = task.tgid()?;
        event.pid = task.pid()?;
        event.uid = task.uid();
        event.fd = args.fd;
        event.len = len as u32;
        event.sequence_id = sequence_id as u32;
        event.direction = direction as u32;
        event.commit();
        Ok(0)
    }

    pub fn on_close(&self, fd: i32) -> Result<u32, InsightError> {
        self.connections.remove(&fd);
        Ok(0)
    }
}
