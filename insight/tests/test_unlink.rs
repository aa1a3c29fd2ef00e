mod common;

use std::path::Path;

use common::{init_logger, traced};
use insight::config;
use insight::task::{ForcedReturn, HostMemory, HostTask};
use insight::tracer::UnlinkTracer;
use insight_common::event::c_str;
use insight_common::AT_REMOVEDIR;

const AGENT: u32 = 77;

fn tracer() -> UnlinkTracer {
    UnlinkTracer::new(config::unlink(AGENT, Path::new("/data/")).unwrap(), 1)
}

fn path(memory: &HostMemory, path: &str) -> u64 {
    let mut raw = path.as_bytes().to_vec();
    raw.push(0);
    memory.alloc(raw)
}

#[test]
fn matching_unlink_is_swallowed() {
    init_logger();
    let tracer = tracer();
    let memory = HostMemory::new();
    let regs = ForcedReturn::new();
    let task = traced().uid(33);

    tracer.sys_enter_unlink(&task, path(&memory, "/data/segment-0001.log"));
    tracer.sys_unlink(&task, &memory, &regs);

    assert_eq!(regs.get(), Some(0));
    let events = tracer.events().drain();
    assert_eq!(events.len(), 1);
    assert_eq!(c_str(&events[0].pathname), b"/data/segment-0001.log");
    assert_eq!(events[0].uid, 33);
}

#[test]
fn other_directories_are_left_alone() {
    init_logger();
    let tracer = tracer();
    let memory = HostMemory::new();
    let regs = ForcedReturn::new();
    let task = traced();

    tracer.sys_enter_unlinkat(&task, path(&memory, "/tmp/scratch"), 0);
    tracer.sys_unlinkat(&task, &memory, &regs);

    assert_eq!(regs.get(), None);
    assert!(tracer.events().drain().is_empty());

    // the entry was consumed, a second intercept has nothing to act on
    tracer.sys_unlinkat(&task, &memory, &regs);
    assert_eq!(regs.get(), None);
}

#[test]
fn agent_and_its_children_are_never_intercepted() {
    init_logger();
    let tracer = tracer();
    let memory = HostMemory::new();
    let target = path(&memory, "/data/segment-0002.log");

    for task in [HostTask::new(AGENT), HostTask::new(78).child_of(AGENT)] {
        let regs = ForcedReturn::new();
        tracer.sys_enter_unlink(&task, target);
        tracer.sys_unlink(&task, &memory, &regs);
        assert_eq!(regs.get(), None);
    }
    assert!(tracer.events().drain().is_empty());
}

#[test]
fn directory_removal_is_ignored() {
    init_logger();
    let tracer = tracer();
    let memory = HostMemory::new();
    let regs = ForcedReturn::new();
    let task = traced();

    tracer.sys_enter_unlinkat(&task, path(&memory, "/data/old"), AT_REMOVEDIR);
    tracer.sys_unlinkat(&task, &memory, &regs);

    assert_eq!(regs.get(), None);
    assert!(tracer.events().drain().is_empty());
}

#[test]
fn unreadable_path_is_not_intercepted() {
    init_logger();
    let tracer = tracer();
    let memory = HostMemory::new();
    let regs = ForcedReturn::new();
    let task = traced();

    tracer.sys_enter_unlink(&task, 0x1000);
    assert_ne!(tracer.sys_unlink(&task, &memory, &regs), 0);
    assert_eq!(regs.get(), None);
    assert!(tracer.events().drain().is_empty());
}
