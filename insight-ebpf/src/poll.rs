use aya_ebpf::macros::{map, tracepoint};
use aya_ebpf::maps::{LruHashMap, PerCpuArray, PerfEventArray};
use aya_ebpf::programs::TracePointContext;

use insight_common::config::ScopeConfig;
use insight_common::event::PollEvent;
use insight_common::probe::poll::{PollProbe, SocketArgs};
use insight_common::{InsightError, MAX_ENTRIES};

use crate::runtime::{syscall_arg, syscall_ret, Current, PerfSink, Table, UserSpace};

#[no_mangle]
static mut TOOL_CONFIG_POLL: ScopeConfig = ScopeConfig::new();

#[map]
static POLL_SOCKETS: LruHashMap<i32, SocketArgs> =
    LruHashMap::with_max_entries(MAX_ENTRIES, 0);
#[map]
static POLL_ARGS: LruHashMap<u32, SocketArgs> =
    LruHashMap::with_max_entries(MAX_ENTRIES, 0);
#[map]
static POLL_SCRATCH: PerCpuArray<PollEvent> = PerCpuArray::with_max_entries(1, 0);
#[map]
static POLL_EVENTS: PerfEventArray<PollEvent> = PerfEventArray::new(0);

type Probe<'a> = PollProbe<
    'a,
    Table<LruHashMap<i32, SocketArgs>>,
    Table<LruHashMap<u32, SocketArgs>>,
    PerfSink<'a, TracePointContext, PollEvent>,
>;

#[inline(always)]
fn with_probe<R>(ctx: &TracePointContext, f: impl FnOnce(&Probe<'_>) -> R) -> R {
    let config = crate::tool_config(core::ptr::addr_of!(TOOL_CONFIG_POLL));
    let fds = Table(&POLL_SOCKETS, "poll sockets");
    let args = Table(&POLL_ARGS, "poll args");
    f(&PollProbe {
        config: &config,
        fds: &fds,
        args: &args,
        events: PerfSink::new(ctx, &POLL_SCRATCH, &POLL_EVENTS),
    })
}

#[tracepoint]
fn tracepoint_poll_sys_enter_connect(ctx: TracePointContext) -> u32 {
    match unsafe { try_tracepoint_poll_sys_enter_connect(&ctx) } {
        Ok(res) => res,
        Err(e) => crate::emit_error(&ctx, e, "poll_sys_enter_connect_tracepoint"),
    }
}

unsafe fn try_tracepoint_poll_sys_enter_connect(
    ctx: &TracePointContext,
) -> Result<u32, InsightError> {
    let fd = syscall_arg(ctx, "connect fd", 0)? as i32;
    let uservaddr = syscall_arg(ctx, "connect uservaddr", 1)?;
    with_probe(ctx, |probe| probe.on_connect(&Current, &UserSpace, fd, uservaddr))
}

macro_rules! define_poll {
    ($syscall: ident) => {
        ::paste::paste! {
            #[tracepoint]
            fn [< tracepoint_sys_enter_ $syscall >](ctx: TracePointContext) -> u32 {
                match unsafe { [< try_tracepoint_sys_enter_ $syscall >](&ctx) } {
                    Ok(res) => res,
                    Err(e) => crate::emit_error(&ctx, e, concat!("sys_enter_", stringify!($syscall), "_tracepoint")),
                }
            }

            unsafe fn [< try_tracepoint_sys_enter_ $syscall >](ctx: &TracePointContext) -> Result<u32, InsightError> {
                let ufds = syscall_arg(ctx, concat!(stringify!($syscall), " ufds"), 0)?;
                with_probe(ctx, |probe| probe.on_poll_enter(&Current, &UserSpace, ufds))
            }

            #[tracepoint]
            fn [< tracepoint_sys_exit_ $syscall >](ctx: TracePointContext) -> u32 {
                match unsafe { [< try_tracepoint_sys_exit_ $syscall >](&ctx) } {
                    Ok(res) => res,
                    Err(e) => crate::emit_error(&ctx, e, concat!("sys_exit_", stringify!($syscall), "_tracepoint")),
                }
            }

            unsafe fn [< try_tracepoint_sys_exit_ $syscall >](ctx: &TracePointContext) -> Result<u32, InsightError> {
                let ret = syscall_ret(ctx, concat!(stringify!($syscall), " ret"))?;
                with_probe(ctx, |probe| probe.on_poll_exit(&Current, ret))
            }
        }
    };
}

define_poll!(poll);
define_poll!(ppoll);

#[tracepoint]
fn tracepoint_poll_sys_enter_close(ctx: TracePointContext) -> u32 {
    match unsafe { try_tracepoint_poll_sys_enter_close(&ctx) } {
        Ok(res) => res,
        Err(e) => crate::emit_error(&ctx, e, "poll_sys_enter_close_tracepoint"),
    }
}

unsafe fn try_tracepoint_poll_sys_enter_close(ctx: &TracePointContext) -> Result<u32, InsightError> {
    let fd = syscall_arg(ctx, "close fd", 0)? as i32;
    with_probe(ctx, |probe| probe.on_close(fd))
}
