mod common;

use std::sync::Arc;
use std::thread;

use common::{init_logger, stranger, traced, TRACED};
use insight::config;
use insight::task::HostTask;
use insight::tracer::CpuTracer;
use insight_common::event::c_str;

const MS: u64 = 1_000_000;

fn switch(tracer: &CpuTracer, next: &HostTask, prev: &HostTask, at: u64) {
    tracer.finish_task_switch(&next.clone().at(at), prev);
}

#[test]
fn slices_land_in_log2_millisecond_slots() {
    init_logger();
    let tracer = CpuTracer::new(config::scope(Some(TRACED)));
    let worker = traced().thread(TRACED + 1);
    let idle = HostTask::new(0).child_of(0);

    // worker runs for 5ms, then 1s
    switch(&tracer, &worker, &idle, 10 * MS);
    switch(&tracer, &idle, &worker, 15 * MS);
    switch(&tracer, &worker, &idle, 20 * MS);
    switch(&tracer, &idle, &worker, 1_020 * MS);

    let histogram = tracer.histogram(TRACED).unwrap();
    assert_eq!(histogram.histogram[2], 1);
    assert_eq!(histogram.histogram[9], 1);
    assert_eq!(histogram.total(), 2);
    assert_eq!(c_str(&histogram.comm), b"traced");
    assert_eq!(tracer.tgids(), vec![TRACED]);
}

#[test]
fn unscoped_or_unstarted_tasks_are_not_counted() {
    init_logger();
    let tracer = CpuTracer::new(config::scope(Some(TRACED)));
    let outsider = stranger();
    let worker = traced();

    switch(&tracer, &outsider, &worker, 10 * MS);
    switch(&tracer, &worker, &outsider, 20 * MS);
    assert!(tracer.histogram(outsider.tgid).is_none());
    assert!(tracer.histogram(TRACED).is_none());
}

#[test]
fn sub_millisecond_and_clock_skew() {
    init_logger();
    let tracer = CpuTracer::new(config::scope(None));
    let a = traced();
    let b = stranger();

    switch(&tracer, &a, &b, 10 * MS);
    switch(&tracer, &b, &a, 10 * MS + 10);
    assert_eq!(tracer.histogram(TRACED).unwrap().histogram[0], 1);

    switch(&tracer, &a, &b, 50 * MS);
    switch(&tracer, &b, &a, 40 * MS);
    assert_eq!(tracer.histogram(TRACED).unwrap().total(), 1);
}

#[test]
fn concurrent_switches_sum() {
    init_logger();
    let tracer = Arc::new(CpuTracer::new(config::scope(None)));
    let threads: Vec<_> = (0..4u32)
        .map(|cpu| {
            let tracer = Arc::clone(&tracer);
            thread::spawn(move || {
                let worker = traced().thread(TRACED + 1 + cpu).on_cpu(cpu as usize);
                let idle = HostTask::new(0).child_of(0).on_cpu(cpu as usize);
                for round in 0..250u64 {
                    let base = round * 10 * MS;
                    switch(&tracer, &worker, &idle, base);
                    switch(&tracer, &idle, &worker, base + 2 * MS);
                }
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }

    let histogram = tracer.histogram(TRACED).unwrap();
    assert_eq!(histogram.histogram[1], 1000);
}
