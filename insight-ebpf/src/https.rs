//! Attached by the loader to `SSL_write` and `SSL_read` of the traced process' TLS
//! library.

use aya_ebpf::macros::{map, uprobe, uretprobe};
use aya_ebpf::maps::{LruHashMap, PerCpuArray, PerfEventArray};
use aya_ebpf::programs::{ProbeContext, RetProbeContext};
use aya_ebpf::EbpfContext;

use insight_common::config::ScopeConfig;
use insight_common::event::{HttpsEvent, PayloadKind};
use insight_common::probe::https::HttpsProbe;
use insight_common::InsightError::MissingArg;
use insight_common::{InsightError, MAX_ENTRIES};

use crate::runtime::{Current, PerfSink, Table, UserSpace};

#[no_mangle]
static mut TOOL_CONFIG_HTTPS: ScopeConfig = ScopeConfig::new();

#[map]
static HTTPS_BUFFERS: LruHashMap<u32, u64> = LruHashMap::with_max_entries(MAX_ENTRIES, 0);
#[map]
static HTTPS_SCRATCH: PerCpuArray<HttpsEvent> = PerCpuArray::with_max_entries(1, 0);
#[map]
static HTTPS_EVENTS: PerfEventArray<HttpsEvent> = PerfEventArray::new(0);

type Probe<'a, C> =
    HttpsProbe<'a, Table<LruHashMap<u32, u64>>, PerfSink<'a, C, HttpsEvent>>;

#[inline(always)]
fn with_probe<C: EbpfContext, R>(ctx: &C, f: impl FnOnce(&Probe<'_, C>) -> R) -> R {
    let config = crate::tool_config(core::ptr::addr_of!(TOOL_CONFIG_HTTPS));
    let buffers = Table(&HTTPS_BUFFERS, "https buffers");
    f(&HttpsProbe {
        config: &config,
        buffers: &buffers,
        events: PerfSink::new(ctx, &HTTPS_SCRATCH, &HTTPS_EVENTS),
    })
}

macro_rules! define_ssl {
    ($function: ident, $kind: expr) => {
        ::paste::paste! {
            #[uprobe]
            fn [< uprobe_ $function >](probe: ProbeContext) -> u32 {
                match unsafe { [< try_uprobe_ $function >](&probe) } {
                    Ok(res) => res,
                    Err(e) => crate::emit_error(&probe, e, concat!(stringify!($function), "_uprobe")),
                }
            }

            #[inline(always)]
            unsafe fn [< try_uprobe_ $function >](probe: &ProbeContext) -> Result<u32, InsightError> {
                // (ssl, buf, num)
                let buf: u64 = probe.arg(1).ok_or(MissingArg(stringify!($function), 1))?;
                with_probe(probe, |p| p.on_enter(&Current, buf))
            }

            #[uretprobe]
            fn [< uretprobe_ $function >](probe: RetProbeContext) -> u32 {
                match unsafe { [< try_uretprobe_ $function >](&probe) } {
                    Ok(res) => res,
                    Err(e) => crate::emit_error(&probe, e, concat!(stringify!($function), "_uretprobe")),
                }
            }

            #[inline(always)]
            unsafe fn [< try_uretprobe_ $function >](probe: &RetProbeContext) -> Result<u32, InsightError> {
                let ret: i32 = probe.ret().ok_or(MissingArg(stringify!($function), 0))?;
                with_probe(probe, |p| p.on_exit(&Current, &UserSpace, $kind, ret as i64))
            }
        }
    };
}

define_ssl!(ssl_write, PayloadKind::Request);
define_ssl!(ssl_read, PayloadKind::Response);
