//! Fixed-layout records emitted by the tracers.
//!
//! Discriminants are stored as raw integers so every record stays valid for any bit
//! pattern the consumer reads back; use the typed accessors to decode them.

use crate::pipeline::Zeroable;
use crate::{FILENAME_LEN, MAX_DATA_SIZE, MAX_SLOTS, PATH_MAX, TASK_COMM_LEN};

/// Which half of a request/response exchange a payload belongs to.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "user", derive(strum_macros::IntoStaticStr))]
pub enum PayloadKind {
    Request = 0,
    Response = 1,
}

impl TryFrom<u32> for PayloadKind {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PayloadKind::Request),
            1 => Ok(PayloadKind::Response),
            other => Err(other),
        }
    }
}

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "user", derive(strum_macros::IntoStaticStr))]
pub enum Protocol {
    Ipv4 = 0,
    Ipv6 = 1,
}

impl TryFrom<u32> for Protocol {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Protocol::Ipv4),
            1 => Ok(Protocol::Ipv6),
            other => Err(other),
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "user", derive(strum_macros::IntoStaticStr))]
pub enum FileOp {
    Read = 0,
    Write = 1,
}

impl TryFrom<u8> for FileOp {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FileOp::Read),
            1 => Ok(FileOp::Write),
            other => Err(other),
        }
    }
}

/// Direction of a MySQL payload, inferred from the syscall that carried it.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "user", derive(strum_macros::IntoStaticStr))]
pub enum Direction {
    /// Sent by the traced client.
    ClientToServer = 0,
    /// Received by the traced client.
    ServerToClient = 1,
}

impl TryFrom<u32> for Direction {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Direction::ClientToServer),
            1 => Ok(Direction::ServerToClient),
            other => Err(other),
        }
    }
}

/// An outbound TCP connect that completed successfully.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ConnectEvent {
    pub tgid: u32,
    pub pid: u32,
    pub uid: u32,
    /// Network byte order.
    pub daddr_v4: u32,
    pub daddr_v6: [u8; 16],
    /// Host byte order.
    pub dport: u16,
    pub _pad: u16,
    pub comm: [u8; TASK_COMM_LEN],
    pub protocol: u32,
}

impl ConnectEvent {
    pub fn protocol(&self) -> Option<Protocol> {
        Protocol::try_from(self.protocol).ok()
    }
}

/// A poll on a socket previously seen in an IPv4 connect.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PollEvent {
    pub tgid: u32,
    pub pid: u32,
    pub uid: u32,
    pub fd: i32,
    pub sin_addr: u32,
    pub sin_port: u32,
    pub ret: i32,
}

/// A deletion that was intercepted and answered with a forged success.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct UnlinkEvent {
    pub tgid: u32,
    pub pid: u32,
    pub uid: u32,
    pub pathname: [u8; PATH_MAX],
}

/// log2 histogram of on-CPU slices in milliseconds, one per thread group.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CpuHistogram {
    pub histogram: [u32; MAX_SLOTS],
    pub comm: [u8; TASK_COMM_LEN],
}

impl CpuHistogram {
    pub const fn new(comm: [u8; TASK_COMM_LEN]) -> Self {
        Self {
            histogram: [0; MAX_SLOTS],
            comm,
        }
    }

    pub fn total(&self) -> u64 {
        self.histogram.iter().map(|&c| c as u64).sum()
    }
}

/// Plaintext payload of a `sendto` or `recvfrom`. Only the first `len` bytes of `buf`
/// are meaningful.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct HttpEvent {
    pub tgid: u32,
    pub pid: u32,
    pub uid: u32,
    pub len: u32,
    pub buf: [u8; MAX_DATA_SIZE],
    pub kind: u32,
}

/// Decrypted payload of an `SSL_read` or `SSL_write`. `len` is the library's return
/// value; the captured prefix is `min(len, MAX_DATA_SIZE)` bytes.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct HttpsEvent {
    pub tgid: u32,
    pub pid: u32,
    pub uid: u32,
    pub len: u32,
    pub buf: [u8; MAX_DATA_SIZE],
    pub kind: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct MysqlEvent {
    pub tgid: u32,
    pub pid: u32,
    pub uid: u32,
    pub fd: i32,
    pub len: u32,
    pub sequence_id: u32,
    pub buf: [u8; MAX_DATA_SIZE],
    pub direction: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct VfsEvent {
    pub pid: u32,
    pub tgid: u32,
    pub uid: u32,
    pub _pad: u32,
    pub ts: u64,
    pub size: u64,
    pub ret: i64,
    pub op: u8,
    pub comm: [u8; TASK_COMM_LEN],
    pub filename: [u8; FILENAME_LEN],
}

impl VfsEvent {
    pub fn op(&self) -> Option<FileOp> {
        FileOp::try_from(self.op).ok()
    }
}

/// Value of the path cache: a resolved, NUL-terminated absolute path.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct PathEntry {
    pub filename: [u8; FILENAME_LEN],
}

impl PathEntry {
    pub const fn empty() -> Self {
        Self {
            filename: [0; FILENAME_LEN],
        }
    }
}

macro_rules! payload_accessors {
    ($($record:ty => $kind:ident: $kind_ty:ty),* $(,)?) => {
        $(
            impl $record {
                /// The captured bytes, bounded by the record's capacity.
                pub fn payload(&self) -> &[u8] {
                    &self.buf[..(self.len as usize).min(MAX_DATA_SIZE)]
                }

                pub fn $kind(&self) -> Option<$kind_ty> {
                    <$kind_ty>::try_from(self.$kind).ok()
                }
            }
        )*
    };
}

payload_accessors! {
    HttpEvent => kind: PayloadKind,
    HttpsEvent => kind: PayloadKind,
    MysqlEvent => direction: Direction,
}

/// Bytes of a NUL-terminated field, up to but excluding the terminator.
pub fn c_str(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

unsafe impl Zeroable for ConnectEvent {}
unsafe impl Zeroable for PollEvent {}
unsafe impl Zeroable for UnlinkEvent {}
unsafe impl Zeroable for CpuHistogram {}
unsafe impl Zeroable for HttpEvent {}
unsafe impl Zeroable for HttpsEvent {}
unsafe impl Zeroable for MysqlEvent {}
unsafe impl Zeroable for VfsEvent {}
unsafe impl Zeroable for PathEntry {}

#[cfg(feature = "user")]
mod pod {
    use super::*;

    unsafe impl aya::Pod for ConnectEvent {}
    unsafe impl aya::Pod for PollEvent {}
    unsafe impl aya::Pod for UnlinkEvent {}
    unsafe impl aya::Pod for CpuHistogram {}
    unsafe impl aya::Pod for HttpEvent {}
    unsafe impl aya::Pod for HttpsEvent {}
    unsafe impl aya::Pod for MysqlEvent {}
    unsafe impl aya::Pod for VfsEvent {}
    unsafe impl aya::Pod for PathEntry {}
}
