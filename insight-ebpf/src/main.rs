#![no_std]
#![no_main]

#[link_section = "license"]
#[no_mangle]
pub static LICENSE: [u8; 4] = *b"GPL\0";

#[allow(nonstandard_style, unused, clippy::all)]
mod binding;

mod connect;
mod cpu;
mod http;
mod https;
mod mysql;
mod poll;
mod runtime;
mod unlink;
mod vfs;

use aya_ebpf::EbpfContext;
use aya_log_ebpf::error;
use core::hint::unreachable_unchecked;

use insight_common::InsightError;
use insight_common::InsightError::{
    CouldntAccessBuffer, CouldntGetPath, CouldntReadKernel, CouldntReadUser, MissingArg,
    OutOfSpace, Unreachable,
};

#[inline(always)]
fn emit_error<C: EbpfContext>(probe: &C, e: InsightError, name: &str) -> u32 {
    match e {
        MissingArg(op, idx) => {
            error!(probe, "{}: Missing arg {} while handling {}", op, idx, name);
        }
        CouldntReadKernel(op, ptr, len) => {
            error!(
                probe,
                "{}: Couldn't read kernel address 0x{:x} ({} bytes) while handling {}",
                op,
                ptr,
                len,
                name
            );
        }
        CouldntReadUser(op, ptr, len) => {
            error!(
                probe,
                "{}: Couldn't read user address 0x{:x} ({} bytes) while handling {}",
                op,
                ptr,
                len,
                name
            );
        }
        CouldntGetPath(op, res) => {
            error!(
                probe,
                "{}: Couldn't get path ({}) while handling {}", op, res, name
            );
        }
        CouldntAccessBuffer(op) => {
            error!(
                probe,
                "{}: Couldn't access buffer while handling {}", op, name
            );
        }
        OutOfSpace(op) => {
            error!(probe, "{}: Ran out of space while handling {}", op, name);
        }
        Unreachable(op) => {
            error!(
                probe,
                "{}: Encountered an unreachable code block while handling {}", op, name
            );
        }
    }
    e.into()
}

/// Loader-patched configuration. The volatile read keeps the compiler from folding the
/// value the object was built with.
#[inline(always)]
fn tool_config<T: Copy>(config: *const T) -> T {
    unsafe { core::ptr::read_volatile(config) }
}

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { unreachable_unchecked() }
}
