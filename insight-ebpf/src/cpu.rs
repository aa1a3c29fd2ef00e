use aya_ebpf::macros::{kprobe, map};
use aya_ebpf::maps::{HashMap, LruHashMap};
use aya_ebpf::programs::ProbeContext;

use insight_common::config::ScopeConfig;
use insight_common::event::CpuHistogram;
use insight_common::probe::cpu::CpuProbe;
use insight_common::InsightError::MissingArg;
use insight_common::{InsightError, CPU_MAX_ENTRIES};

use crate::binding::task_struct;
use crate::runtime::{Current, Histograms, Table, Task};

#[no_mangle]
static mut TOOL_CONFIG_CPU: ScopeConfig = ScopeConfig::new();

#[map]
static CPU_STARTS: LruHashMap<u32, u64> = LruHashMap::with_max_entries(CPU_MAX_ENTRIES, 0);
#[map]
static CPU_HISTOGRAMS: HashMap<u32, CpuHistogram> =
    HashMap::with_max_entries(CPU_MAX_ENTRIES, 0);

/// Attached to `finish_task_switch.isra.0`, which runs on the incoming task.
#[kprobe]
fn kprobe_finish_task_switch(ctx: ProbeContext) -> u32 {
    match unsafe { try_kprobe_finish_task_switch(&ctx) } {
        Ok(res) => res,
        Err(e) => crate::emit_error(&ctx, e, "finish_task_switch_kprobe"),
    }
}

unsafe fn try_kprobe_finish_task_switch(ctx: &ProbeContext) -> Result<u32, InsightError> {
    let prev: *const task_struct = ctx.arg(0).ok_or(MissingArg("finish_task_switch prev", 0))?;
    let config = crate::tool_config(core::ptr::addr_of!(TOOL_CONFIG_CPU));
    let probe = CpuProbe {
        config: &config,
        starts: &Table(&CPU_STARTS, "cpu starts"),
        histograms: &Histograms(&CPU_HISTOGRAMS),
    };
    probe.on_switch(&Current, &Task(prev))
}
