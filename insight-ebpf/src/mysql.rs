use aya_ebpf::macros::{map, tracepoint};
use aya_ebpf::maps::{LruHashMap, PerCpuArray, PerfEventArray};
use aya_ebpf::programs::TracePointContext;

use insight_common::config::MysqlConfig;
use insight_common::event::{Direction, MysqlEvent};
use insight_common::mysql::ConnectionInfo;
use insight_common::probe::mysql::MysqlProbe;
use insight_common::probe::SyscallArgs;
use insight_common::{InsightError, MAX_ENTRIES};

use crate::runtime::{syscall_arg, syscall_ret, Current, PerfSink, Table, UserSpace};

#[no_mangle]
static mut TOOL_CONFIG_MYSQL: MysqlConfig = MysqlConfig::new();

#[map]
static MYSQL_CONNECTIONS: LruHashMap<i32, ConnectionInfo> =
    LruHashMap::with_max_entries(MAX_ENTRIES, 0);
#[map]
static MYSQL_ARGS: LruHashMap<u32, SyscallArgs> =
    LruHashMap::with_max_entries(MAX_ENTRIES, 0);
#[map]
static MYSQL_SCRATCH: PerCpuArray<MysqlEvent> = PerCpuArray::with_max_entries(1, 0);
#[map]
static MYSQL_EVENTS: PerfEventArray<MysqlEvent> = PerfEventArray::new(0);

type Probe<'a> = MysqlProbe<
    'a,
    Table<LruHashMap<i32, ConnectionInfo>>,
    Table<LruHashMap<u32, SyscallArgs>>,
    PerfSink<'a, TracePointContext, MysqlEvent>,
>;

#[inline(always)]
fn with_probe<R>(ctx: &TracePointContext, f: impl FnOnce(&Probe<'_>) -> R) -> R {
    let config = crate::tool_config(core::ptr::addr_of!(TOOL_CONFIG_MYSQL));
    let connections = Table(&MYSQL_CONNECTIONS, "mysql connections");
    let args = Table(&MYSQL_ARGS, "mysql args");
    f(&MysqlProbe {
        config: &config,
        connections: &connections,
        args: &args,
        events: PerfSink::new(ctx, &MYSQL_SCRATCH, &MYSQL_EVENTS),
    })
}

#[tracepoint]
fn tracepoint_mysql_sys_enter_connect(ctx: TracePointContext) -> u32 {
    match unsafe { try_tracepoint_mysql_sys_enter_connect(&ctx) } {
        Ok(res) => res,
        Err(e) => crate::emit_error(&ctx, e, "mysql_sys_enter_connect_tracepoint"),
    }
}

unsafe fn try_tracepoint_mysql_sys_enter_connect(
    ctx: &TracePointContext,
) -> Result<u32, InsightError> {
    let fd = syscall_arg(ctx, "connect fd", 0)? as i32;
    let uservaddr = syscall_arg(ctx, "connect uservaddr", 1)?;
    with_probe(ctx, |probe| probe.on_connect(&Current, &UserSpace, fd, uservaddr))
}

macro_rules! define_mysql {
    ($syscall: ident, $direction: expr) => {
        ::paste::paste! {
            #[tracepoint]
            fn [< tracepoint_mysql_sys_enter_ $syscall >](ctx: TracePointContext) -> u32 {
                match unsafe { [< try_tracepoint_mysql_sys_enter_ $syscall >](&ctx) } {
                    Ok(res) => res,
                    Err(e) => crate::emit_error(&ctx, e, concat!("mysql_sys_enter_", stringify!($syscall), "_tracepoint")),
                }
            }

            unsafe fn [< try_tracepoint_mysql_sys_enter_ $syscall >](ctx: &TracePointContext) -> Result<u32, InsightError> {
                let fd = syscall_arg(ctx, concat!(stringify!($syscall), " fd"), 0)? as i32;
                let buf = syscall_arg(ctx, concat!(stringify!($syscall), " buff"), 1)?;
                let len = syscall_arg(ctx, concat!(stringify!($syscall), " len"), 2)?;
                with_probe(ctx, |probe| probe.on_enter(&Current, SyscallArgs::new(fd, buf, len)))
            }

            #[tracepoint]
            fn [< tracepoint_mysql_sys_exit_ $syscall >](ctx: TracePointContext) -> u32 {
                match unsafe { [< try_tracepoint_mysql_sys_exit_ $syscall >](&ctx) } {
                    Ok(res) => res,
                    Err(e) => crate::emit_error(&ctx, e, concat!("mysql_sys_exit_", stringify!($syscall), "_tracepoint")),
                }
            }

            unsafe fn [< try_tracepoint_mysql_sys_exit_ $syscall >](ctx: &TracePointContext) -> Result<u32, InsightError> {
                let ret = syscall_ret(ctx, concat!(stringify!($syscall), " ret"))?;
                with_probe(ctx, |probe| probe.on_exit(&Current, &UserSpace, $direction, ret))
            }
        }
    };
}

define_mysql!(sendto, Direction::ClientToServer);
define_mysql!(recvfrom, Direction::ServerToClient);

#[tracepoint]
fn tracepoint_mysql_sys_enter_close(ctx: TracePointContext) -> u32 {
    match unsafe { try_tracepoint_mysql_sys_enter_close(&ctx) } {
        Ok(res) => res,
        Err(e) => crate::emit_error(&ctx, e, "mysql_sys_enter_close_tracepoint"),
    }
}

unsafe fn try_tracepoint_mysql_sys_enter_close(
    ctx: &TracePointContext,
) -> Result<u32, InsightError> {
    let fd = syscall_arg(ctx, "close fd", 0)? as i32;
    with_probe(ctx, |probe| probe.on_close(fd))
}
