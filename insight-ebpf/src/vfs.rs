//! File reads and writes. The `file_open` hook fills the path cache the exit hooks read
//! from; it never denies an open.

use aya_ebpf::macros::{fexit, lsm, map};
use aya_ebpf::maps::{LruHashMap, RingBuf};
use aya_ebpf::programs::{FExitContext, LsmContext};

use insight_common::config::ScopeConfig;
use insight_common::event::{FileOp, PathEntry, VfsEvent};
use insight_common::probe::vfs::VfsProbe;
use insight_common::{InsightError, PATH_CACHE_ENTRIES};

use crate::binding::file;
use crate::runtime::{Current, File, Paths, RingSink};

#[no_mangle]
static mut TOOL_CONFIG_VFS: ScopeConfig = ScopeConfig::new();

#[map]
static VFS_PATHS: LruHashMap<u64, PathEntry> =
    LruHashMap::with_max_entries(PATH_CACHE_ENTRIES, 0);
#[map]
static VFS_EVENTS: RingBuf = RingBuf::with_byte_size(1 << 24, 0);

#[inline(always)]
fn with_probe<R>(f: impl FnOnce(&VfsProbe<'_, Paths, RingSink<VfsEvent>>) -> R) -> R {
    let config = crate::tool_config(core::ptr::addr_of!(TOOL_CONFIG_VFS));
    f(&VfsProbe {
        config: &config,
        paths: &Paths(&VFS_PATHS),
        events: RingSink::new(&VFS_EVENTS),
    })
}

#[lsm(hook = "file_open")]
fn lsm_vfs_file_open(ctx: LsmContext) -> i32 {
    if let Err(e) = unsafe { try_lsm_vfs_file_open(&ctx) } {
        crate::emit_error(&ctx, e, "vfs_file_open_lsm");
    }
    0
}

unsafe fn try_lsm_vfs_file_open(ctx: &LsmContext) -> Result<u32, InsightError> {
    let file: *const file = ctx.arg(0);
    with_probe(|probe| probe.on_open(&File(file)))
}

macro_rules! define_vfs {
    ($function: ident, $name: literal, $op: expr) => {
        ::paste::paste! {
            #[fexit(function = $name)]
            fn [< fexit_ $function >](ctx: FExitContext) -> u32 {
                match unsafe { [< try_fexit_ $function >](&ctx) } {
                    Ok(res) => res,
                    Err(e) => crate::emit_error(&ctx, e, concat!($name, "_fexit")),
                }
            }

            unsafe fn [< try_fexit_ $function >](ctx: &FExitContext) -> Result<u32, InsightError> {
                // (file, buf, count, pos), the return value follows the arguments
                let file: *const file = ctx.arg(0);
                let ret: i64 = ctx.arg(4);
                with_probe(|probe| probe.on_exit(&Current, &File(file), $op, ret))
            }
        }
    };
}

define_vfs!(vfs_read, "vfs_read", FileOp::Read);
define_vfs!(vfs_write, "vfs_write", FileOp::Write);
