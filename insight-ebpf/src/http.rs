use aya_ebpf::macros::{map, tracepoint};
use aya_ebpf::maps::{LruHashMap, PerCpuArray, PerfEventArray};
use aya_ebpf::programs::TracePointContext;

use insight_common::config::ScopeConfig;
use insight_common::event::{HttpEvent, PayloadKind};
use insight_common::probe::http::HttpProbe;
use insight_common::probe::SyscallArgs;
use insight_common::{InsightError, MAX_ENTRIES};

use crate::runtime::{syscall_arg, syscall_ret, Current, PerfSink, Table, UserSpace};

#[no_mangle]
static mut TOOL_CONFIG_HTTP: ScopeConfig = ScopeConfig::new();

#[map]
static HTTP_ARGS: LruHashMap<u32, SyscallArgs> =
    LruHashMap::with_max_entries(MAX_ENTRIES, 0);
#[map]
static HTTP_SCRATCH: PerCpuArray<HttpEvent> = PerCpuArray::with_max_entries(1, 0);
#[map]
static HTTP_EVENTS: PerfEventArray<HttpEvent> = PerfEventArray::new(0);

type Probe<'a> =
    HttpProbe<'a, Table<LruHashMap<u32, SyscallArgs>>, PerfSink<'a, TracePointContext, HttpEvent>>;

#[inline(always)]
fn with_probe<R>(ctx: &TracePointContext, f: impl FnOnce(&Probe<'_>) -> R) -> R {
    let config = crate::tool_config(core::ptr::addr_of!(TOOL_CONFIG_HTTP));
    let args = Table(&HTTP_ARGS, "http args");
    f(&HttpProbe {
        config: &config,
        args: &args,
        events: PerfSink::new(ctx, &HTTP_SCRATCH, &HTTP_EVENTS),
    })
}

macro_rules! define_http {
    ($syscall: ident, $kind: expr) => {
        ::paste::paste! {
            #[tracepoint]
            fn [< tracepoint_http_sys_enter_ $syscall >](ctx: TracePointContext) -> u32 {
                match unsafe { [< try_tracepoint_http_sys_enter_ $syscall >](&ctx) } {
                    Ok(res) => res,
                    Err(e) => crate::emit_error(&ctx, e, concat!("http_sys_enter_", stringify!($syscall), "_tracepoint")),
                }
            }

            unsafe fn [< try_tracepoint_http_sys_enter_ $syscall >](ctx: &TracePointContext) -> Result<u32, InsightError> {
                let fd = syscall_arg(ctx, concat!(stringify!($syscall), " fd"), 0)? as i32;
                let buf = syscall_arg(ctx, concat!(stringify!($syscall), " buff"), 1)?;
                let len = syscall_arg(ctx, concat!(stringify!($syscall), " len"), 2)?;
                with_probe(ctx, |probe| probe.on_enter(&Current, SyscallArgs::new(fd, buf, len)))
            }

            #[tracepoint]
            fn [< tracepoint_http_sys_exit_ $syscall >](ctx: TracePointContext) -> u32 {
                match unsafe { [< try_tracepoint_http_sys_exit_ $syscall >](&ctx) } {
                    Ok(res) => res,
                    Err(e) => crate::emit_error(&ctx, e, concat!("http_sys_exit_", stringify!($syscall), "_tracepoint")),
                }
            }

            unsafe fn [< try_tracepoint_http_sys_exit_ $syscall >](ctx: &TracePointContext) -> Result<u32, InsightError> {
                let ret = syscall_ret(ctx, concat!(stringify!($syscall), " ret"))?;
                with_probe(ctx, |probe| probe.on_exit(&Current, &UserSpace, $kind, ret))
            }
        }
    };
}

define_http!(sendto, PayloadKind::Request);
define_http!(recvfrom, PayloadKind::Response);
