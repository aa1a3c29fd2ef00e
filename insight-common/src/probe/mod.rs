//! Hook logic of every tracer, written once against [`crate::pipeline`].
//!
//! Each tracer is a struct bundling its configuration, its tables and its event sink.
//! The kernel programs build one per invocation around their maps; the host harness
//! builds one around its own tables. Hook methods return `Ok(0)` for scope and
//! correlation misses and an error for exhaustion or failed reads, after any claimed
//! correlation entry has been released.

pub mod connect;
pub mod cpu;
pub mod http;
pub mod https;
pub mod mysql;
pub mod poll;
pub mod unlink;
pub mod vfs;

use crate::pipeline::UserMemory;
use crate::{InsightError, AF_INET};

/// Arguments of a `sendto`/`recvfrom` style call captured at entry.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallArgs {
    pub fd: i32,
    pub _pad: u32,
    pub buf: u64,
    pub len: u64,
}

impl SyscallArgs {
    pub const fn new(fd: i32, buf: u64, len: u64) -> Self {
        Self {
            fd,
            _pad: 0,
            buf,
            len,
        }
    }
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for SyscallArgs {}

/// The IPv4 part of a user-supplied `sockaddr_in`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SockaddrIn {
    /// Network byte order, as found in `sin_addr`.
    pub addr: u32,
    /// Host byte order.
    pub port: u16,
}

/// Reads `uaddr` and returns its address and port if it is an `AF_INET` address.
#[inline(always)]
pub(crate) fn read_sockaddr_in<M: UserMemory>(
    memory: &M,
    uaddr: u64,
) -> Result<Option<SockaddrIn>, InsightError> {
    let mut family = [0u8; 2];
    memory.read_user(uaddr, &mut family)?;
    if u16::from_ne_bytes(family) != AF_INET {
        return Ok(None);
    }

    let mut rest = [0u8; 6];
    memory.read_user(uaddr + 2, &mut rest)?;
    Ok(Some(SockaddrIn {
        port: u16::from_be_bytes([rest[0], rest[1]]),
        addr: u32::from_ne_bytes([rest[2], rest[3], rest[4], rest[5]]),
    }))
}
