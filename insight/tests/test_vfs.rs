mod common;

use common::{init_logger, stranger, traced, TRACED};
use insight::config;
use insight::task::HostFile;
use insight::tracer::VfsTracer;
use insight_common::event::{c_str, FileOp, VfsEvent};

#[test]
fn cached_path_is_reported_in_full() {
    init_logger();
    let tracer = VfsTracer::new(config::scope(Some(TRACED)));
    let task = traced().at(1_000);
    let file = HostFile::regular(0xffff_8880_0000_1000, "/home/user/project/main.c");

    assert_eq!(tracer.file_open(&file), 0);
    assert_eq!(tracer.cached_paths(), 1);
    tracer.vfs_read(&task, &file, 512);
    tracer.vfs_write(&task, &file, -28);

    let events = tracer.events().drain();
    assert_eq!(events.len(), 2);
    assert_eq!(c_str(&events[0].filename), b"/home/user/project/main.c");
    assert_eq!(events[0].op(), Some(FileOp::Read));
    assert_eq!(events[0].size, 512);
    assert_eq!(events[0].ts, 1_000);
    assert_eq!(c_str(&events[0].comm), b"traced");
    assert_eq!(events[1].op(), Some(FileOp::Write));
    assert_eq!(events[1].size, 0);
    assert_eq!(events[1].ret, -28);
}

#[test]
fn excluded_paths_are_discarded() {
    init_logger();
    let tracer = VfsTracer::new(config::scope(None));
    let task = traced();

    for (identity, path) in [
        (1, "/proc/self/status"),
        (2, "/sys/kernel/mm/transparent_hugepage/enabled"),
        (3, "/home/user/.cache/pip/http/index"),
    ] {
        let file = HostFile::regular(identity, path);
        tracer.file_open(&file);
        tracer.vfs_read(&task, &file, 64);
    }
    assert!(tracer.events().drain().is_empty());
    assert_eq!(tracer.events().used(), 0);
}

#[test]
fn cache_miss_reports_basename_unfiltered() {
    init_logger();
    let tracer = VfsTracer::new(config::scope(None));
    let task = traced();

    let file = HostFile::regular(9, "/proc/self/status");
    tracer.vfs_read(&task, &file, 64);

    let events = tracer.events().drain();
    assert_eq!(events.len(), 1);
    assert_eq!(c_str(&events[0].filename), b"status");
}

#[test]
fn unresolvable_open_leaves_cache_untouched() {
    init_logger();
    let tracer = VfsTracer::new(config::scope(None));
    let long = HostFile::regular(4, &format!("/srv/{}/data.bin", "d".repeat(300)));

    assert_eq!(tracer.file_open(&long), 0);
    assert_eq!(tracer.cached_paths(), 0);

    tracer.vfs_read(&traced(), &long, 1);
    assert_eq!(c_str(&tracer.events().drain()[0].filename), b"data.bin");
}

#[test]
fn special_files_and_foreign_processes_are_skipped() {
    init_logger();
    let tracer = VfsTracer::new(config::scope(Some(TRACED)));
    let pipe = HostFile::special(1, "pipe:[4026532]");
    let file = HostFile::regular(2, "/var/log/app.log");

    tracer.vfs_write(&traced(), &pipe, 10);
    tracer.vfs_write(&stranger(), &file, 10);
    assert!(tracer.events().drain().is_empty());
}

#[test]
fn full_ring_drops_until_consumed() {
    init_logger();
    let tracer = VfsTracer::with_ring_size(config::scope(None), std::mem::size_of::<VfsEvent>());
    let task = traced();
    let file = HostFile::regular(1, "/var/log/app.log");

    tracer.vfs_read(&task, &file, 1);
    assert_ne!(tracer.vfs_read(&task, &file, 2), 0);
    assert_eq!(tracer.events().try_recv().map(|e| e.size), Some(1));

    tracer.vfs_read(&task, &file, 3);
    assert_eq!(tracer.events().try_recv().map(|e| e.size), Some(3));
}
