use core::ptr::addr_of;

use aya_ebpf::macros::{fentry, fexit, map};
use aya_ebpf::maps::{LruHashMap, PerCpuArray, PerfEventArray};
use aya_ebpf::programs::{FEntryContext, FExitContext};
use aya_ebpf::EbpfContext;

use insight_common::config::ConnectConfig;
use insight_common::event::{ConnectEvent, Protocol};
use insight_common::probe::connect::ConnectProbe;
use insight_common::{InsightError, MAX_ENTRIES};

use crate::runtime::{Current, KernelSockets, PerfSink, Table};

#[no_mangle]
static mut TOOL_CONFIG_CONNECT: ConnectConfig = ConnectConfig::new();

#[map]
static CONNECT_SOCKETS: LruHashMap<u32, u64> = LruHashMap::with_max_entries(MAX_ENTRIES, 0);
#[map]
static CONNECT_SCRATCH: PerCpuArray<ConnectEvent> = PerCpuArray::with_max_entries(1, 0);
#[map]
static CONNECT_EVENTS: PerfEventArray<ConnectEvent> = PerfEventArray::new(0);

type Probe<'a, C> =
    ConnectProbe<'a, Table<LruHashMap<u32, u64>>, PerfSink<'a, C, ConnectEvent>>;

#[inline(always)]
fn with_probe<C: EbpfContext, R>(ctx: &C, f: impl FnOnce(&Probe<'_, C>) -> R) -> R {
    let sockets = Table(&CONNECT_SOCKETS, "connect sockets");
    // the allow-lists are too large to copy onto the stack
    let config = unsafe { &*addr_of!(TOOL_CONFIG_CONNECT) };
    f(&ConnectProbe {
        config,
        sockets: &sockets,
        events: PerfSink::new(ctx, &CONNECT_SCRATCH, &CONNECT_EVENTS),
    })
}

macro_rules! define_connect {
    ($family: ident, $function: literal, $protocol: expr) => {
        ::paste::paste! {
            #[fentry(function = $function)]
            fn [< fentry_tcp_ $family _connect >](ctx: FEntryContext) -> u32 {
                match unsafe { [< try_fentry_tcp_ $family _connect >](&ctx) } {
                    Ok(res) => res,
                    Err(e) => crate::emit_error(&ctx, e, concat!($function, "_fentry")),
                }
            }

            unsafe fn [< try_fentry_tcp_ $family _connect >](ctx: &FEntryContext) -> Result<u32, InsightError> {
                let sock: u64 = ctx.arg(0);
                with_probe(ctx, |probe| probe.on_enter(&Current, sock))
            }

            #[fexit(function = $function)]
            fn [< fexit_tcp_ $family _connect >](ctx: FExitContext) -> u32 {
                match unsafe { [< try_fexit_tcp_ $family _connect >](&ctx) } {
                    Ok(res) => res,
                    Err(e) => crate::emit_error(&ctx, e, concat!($function, "_fexit")),
                }
            }

            unsafe fn [< try_fexit_tcp_ $family _connect >](ctx: &FExitContext) -> Result<u32, InsightError> {
                // tcp_v{4,6}_connect(sk, uaddr, addr_len), the return value follows the arguments
                let ret: i32 = ctx.arg(3);
                with_probe(ctx, |probe| probe.on_exit(&Current, &KernelSockets, $protocol, ret as i64))
            }
        }
    };
}

define_connect!(v4, "tcp_v4_connect", Protocol::Ipv4);
define_connect!(v6, "tcp_v6_connect", Protocol::Ipv6);
