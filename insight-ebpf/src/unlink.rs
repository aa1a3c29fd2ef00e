//! The delayed-unlink interceptor. Requires a kernel with `CONFIG_BPF_KPROBE_OVERRIDE`.

use aya_ebpf::macros::{kprobe, map, tracepoint};
use aya_ebpf::maps::{LruHashMap, PerCpuArray, PerfEventArray};
use aya_ebpf::programs::{ProbeContext, TracePointContext};
use aya_ebpf::EbpfContext;

use insight_common::config::UnlinkConfig;
use insight_common::event::UnlinkEvent;
use insight_common::probe::unlink::UnlinkProbe;
use insight_common::{InsightError, MAX_ENTRIES};

use crate::runtime::{syscall_arg, Current, PerfSink, Regs, Table, UserSpace};

#[no_mangle]
static mut TOOL_CONFIG_UNLINK: UnlinkConfig = UnlinkConfig::new();

#[map]
static UNLINK_ARGS: LruHashMap<u32, u64> = LruHashMap::with_max_entries(MAX_ENTRIES, 0);
#[map]
static UNLINK_SCRATCH: PerCpuArray<UnlinkEvent> = PerCpuArray::with_max_entries(1, 0);
#[map]
static UNLINK_EVENTS: PerfEventArray<UnlinkEvent> = PerfEventArray::new(0);

type Probe<'a, C> =
    UnlinkProbe<'a, Table<LruHashMap<u32, u64>>, PerfSink<'a, C, UnlinkEvent>>;

#[inline(always)]
fn with_probe<C: EbpfContext, R>(ctx: &C, f: impl FnOnce(&Probe<'_, C>) -> R) -> R {
    let config = crate::tool_config(core::ptr::addr_of!(TOOL_CONFIG_UNLINK));
    let args = Table(&UNLINK_ARGS, "unlink args");
    f(&UnlinkProbe {
        config: &config,
        args: &args,
        events: PerfSink::new(ctx, &UNLINK_SCRATCH, &UNLINK_EVENTS),
    })
}

#[tracepoint]
fn tracepoint_sys_enter_unlink(ctx: TracePointContext) -> u32 {
    match unsafe { try_tracepoint_sys_enter_unlink(&ctx) } {
        Ok(res) => res,
        Err(e) => crate::emit_error(&ctx, e, "sys_enter_unlink_tracepoint"),
    }
}

unsafe fn try_tracepoint_sys_enter_unlink(ctx: &TracePointContext) -> Result<u32, InsightError> {
    let pathname = syscall_arg(ctx, "unlink pathname", 0)?;
    with_probe(ctx, |probe| probe.on_unlink_enter(&Current, pathname))
}

#[tracepoint]
fn tracepoint_sys_enter_unlinkat(ctx: TracePointContext) -> u32 {
    match unsafe { try_tracepoint_sys_enter_unlinkat(&ctx) } {
        Ok(res) => res,
        Err(e) => crate::emit_error(&ctx, e, "sys_enter_unlinkat_tracepoint"),
    }
}

unsafe fn try_tracepoint_sys_enter_unlinkat(ctx: &TracePointContext) -> Result<u32, InsightError> {
    let pathname = syscall_arg(ctx, "unlinkat pathname", 1)?;
    let flags = syscall_arg(ctx, "unlinkat flag", 2)? as i64;
    with_probe(ctx, |probe| probe.on_unlinkat_enter(&Current, pathname, flags))
}

// attached to the arch-prefixed syscall functions, which are on the error-injection list
macro_rules! define_unlink_override {
    ($syscall: ident) => {
        ::paste::paste! {
            #[kprobe]
            fn [< kprobe_sys_ $syscall >](ctx: ProbeContext) -> u32 {
                match unsafe { [< try_kprobe_sys_ $syscall >](&ctx) } {
                    Ok(res) => res,
                    Err(e) => crate::emit_error(&ctx, e, concat!("sys_", stringify!($syscall), "_kprobe")),
                }
            }

            unsafe fn [< try_kprobe_sys_ $syscall >](ctx: &ProbeContext) -> Result<u32, InsightError> {
                with_probe(ctx, |probe| probe.on_intercept(&Current, &UserSpace, &Regs(ctx.regs)))
            }
        }
    };
}

define_unlink_override!(unlink);
define_unlink_override!(unlinkat);
