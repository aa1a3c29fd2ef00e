#![cfg_attr(not(any(feature = "user", test)), no_std)]

pub mod config;
pub mod event;
pub mod filter;
pub mod histogram;
pub mod mysql;
pub mod pipeline;
pub mod probe;

/// Largest payload copied out of a single send/receive call.
pub const MAX_DATA_SIZE: usize = 30720;
/// Capacity of every correlation table.
pub const MAX_ENTRIES: u32 = 10240;
/// Capacity of the histogram and start-time tables of the cpu tracer.
pub const CPU_MAX_ENTRIES: u32 = 1 << 16;
pub const ADDR_LEN: usize = 32;
pub const DIRECTORY_MAX: usize = 128;
pub const PATH_MAX: usize = 4096;
pub const FILENAME_LEN: usize = 256;
pub const TASK_COMM_LEN: usize = 16;
pub const MAX_SLOTS: usize = 32;
pub const PATH_CACHE_ENTRIES: u32 = 8192;
pub const MYSQL_DEFAULT_PORT: u16 = 3306;

pub const AF_INET: u16 = 2;
pub const AF_INET6: u16 = 10;
pub const AT_REMOVEDIR: i64 = 0x200;

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsightError {
    MissingArg(&'static str, usize) = 1,
    CouldntReadKernel(&'static str, u64, usize),
    CouldntReadUser(&'static str, u64, usize),
    CouldntGetPath(&'static str, i64),
    CouldntAccessBuffer(&'static str),
    OutOfSpace(&'static str),
    Unreachable(&'static str),
}

impl InsightError {
    pub const fn code(&self) -> u32 {
        match self {
            InsightError::MissingArg(..) => 1,
            InsightError::CouldntReadKernel(..) => 2,
            InsightError::CouldntReadUser(..) => 3,
            InsightError::CouldntGetPath(..) => 4,
            InsightError::CouldntAccessBuffer(_) => 5,
            InsightError::OutOfSpace(_) => 6,
            InsightError::Unreachable(_) => 7,
        }
    }
}

impl From<InsightError> for u32 {
    fn from(value: InsightError) -> Self {
        value.code()
    }
}

#[cfg(feature = "user")]
impl std::fmt::Display for InsightError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InsightError::MissingArg(op, idx) => write!(f, "{op}: missing arg {idx}"),
            InsightError::CouldntReadKernel(op, ptr, len) => {
                write!(f, "{op}: couldn't read kernel address 0x{ptr:x} ({len} bytes)")
            }
            InsightError::CouldntReadUser(op, ptr, len) => {
                write!(f, "{op}: couldn't read user address 0x{ptr:x} ({len} bytes)")
            }
            InsightError::CouldntGetPath(op, res) => write!(f, "{op}: couldn't get path ({res})"),
            InsightError::CouldntAccessBuffer(op) => write!(f, "{op}: couldn't access buffer"),
            InsightError::OutOfSpace(op) => write!(f, "{op}: ran out of space"),
            InsightError::Unreachable(op) => write!(f, "{op}: reached an unreachable state"),
        }
    }
}

#[cfg(feature = "user")]
impl std::error::Error for InsightError {}

#[cfg(test)]
mod test {
    use super::InsightError;

    #[test]
    fn error_codes_follow_declaration_order() {
        assert_eq!(u32::from(InsightError::MissingArg("x", 0)), 1);
        assert_eq!(u32::from(InsightError::CouldntReadUser("x", 0, 1)), 3);
        assert_eq!(u32::from(InsightError::Unreachable("x")), 7);
    }
}
