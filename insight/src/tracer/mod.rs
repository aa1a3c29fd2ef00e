//! Drivers that own a tracer's tables and channel and expose one method per kernel hook.
//!
//! A driver method plays the part of the program attached to that hook: it builds the
//! probe around the driver's state, runs the hook and turns an error into the program's
//! return code. Errors never reach the caller of the traced function.

mod connect;
mod cpu;
mod http;
mod https;
mod mysql;
mod poll;
mod unlink;
mod vfs;

pub use connect::ConnectTracer;
pub use cpu::CpuTracer;
pub use http::HttpTracer;
pub use https::HttpsTracer;
pub use mysql::MysqlTracer;
pub use poll::PollTracer;
pub use unlink::UnlinkTracer;
pub use vfs::VfsTracer;

use insight_common::InsightError;
use log::debug;

/// Per-CPU queue depth of the fixed-slot channels.
pub const PERF_QUEUE_DEPTH: usize = 64;

/// Byte size of the vfs ring.
pub const VFS_RING_SIZE: usize = 1 << 24;

pub(crate) fn run(program: &'static str, result: Result<u32, InsightError>) -> u32 {
    match result {
        Ok(rc) => rc,
        Err(e) => {
            debug!("{program}: {e}");
            e.into()
        }
    }
}
