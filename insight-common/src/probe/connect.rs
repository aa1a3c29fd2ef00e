//! Successful outbound TCP connects, filtered by destination allow-lists.

use crate::config::ConnectConfig;
use crate::event::{ConnectEvent, Protocol};
use crate::filter::{filter_daddr_v4, filter_daddr_v6};
use crate::pipeline::{
    task_in_scope, CorrelationTable, CurrentTask, EventSink, EventSlot, SocketReader,
};
use crate::InsightError;
use crate::InsightError::OutOfSpace;

pub struct ConnectProbe<'a, A, S> {
    pub config: &'a ConnectConfig,
    /// Socket pointer keyed by thread id, from entry to exit of `tcp_v{4,6}_connect`.
    pub sockets: &'a A,
    pub events: S,
}

impl<A, S> ConnectProbe<'_, A, S>
where
    A: CorrelationTable<u32, u64>,
    S: EventSink<ConnectEvent>,
{
    pub fn on_enter<T: CurrentTask>(&self, task: &T, sock: u64) -> Result<u32, InsightError> {
        if !task_in_scope(task, self.config.tgid)? {
            return Ok(0);
        }
        self.sockets.record(&task.pid()?, &sock)?;
        Ok(0)
    }

    pub fn on_exit<T, R>(
        &self,
        task: &T,
        reader: &R,
        protocol: Protocol,
        ret: i64,
    ) -> Result<u32, InsightError>
    where
        T: CurrentTask,
        R: SocketReader,
    {
        let Some(sock) = self.sockets.take(task.pid()?) else {
            return Ok(0);
        };
        if ret != 0 {
            return Ok(0);
        }

        let destination = reader.destination(*sock, protocol)?;
        let allowed = match protocol {
            Protocol::Ipv4 => filter_daddr_v4(self.config, destination.daddr_v4),
            Protocol::Ipv6 => filter_daddr_v6(self.config, &destination.daddr_v6),
        };
        if !allowed {
            return Ok(0);
        }

        let mut event = self.events.reserve().ok_or(OutOfSpace("connect event"))?;
        event.tgid = task.tgid()?;
        event.pid = task.pid()?;
        event.uid = task.uid();
        event.protocol = protocol as u32;
        event.dport = destination.dport;
        event._pad = 0;
        match protocol {
            Protocol::Ipv4 => {
                event.daddr_v4 = destination.daddr_v4;
                event.daddr_v6 = [0; 16];
            }
            Protocol::Ipv6 => {
                event.daddr_v4 = 0;
                event.daddr_v6 = destination.daddr_v6;
            }
        }
        event.comm = task.comm()?;
        event.commit();
        Ok(0)
    }
}
