mod common;

use common::{init_logger, stranger, traced, TRACED};
use insight::config;
use insight::task::{HostMemory, HostTask};
use insight::tracer::{HttpTracer, HttpsTracer};
use insight_common::event::PayloadKind;
use insight_common::MAX_DATA_SIZE;

const REQUEST: &[u8] = b"GET /health HTTP/1.1\r\nHost: localhost\r\n\r\n";

#[test]
fn request_and_response_are_captured() {
    init_logger();
    let tracer = HttpTracer::new(config::scope(Some(TRACED)), 2);
    let memory = HostMemory::new();
    let task = traced().uid(1000).on_cpu(1);

    let request = memory.alloc(REQUEST.to_vec());
    tracer.sys_enter_sendto(&task, 3, request, REQUEST.len() as u64);
    assert_eq!(tracer.in_flight(), 1);
    tracer.sys_exit_sendto(&task, &memory, REQUEST.len() as i64);
    assert_eq!(tracer.in_flight(), 0);

    let response = memory.alloc(b"HTTP/1.1 200 OK\r\n\r\n".to_vec());
    tracer.sys_enter_recvfrom(&task, 3, response, 4096);
    tracer.sys_exit_recvfrom(&task, &memory, 19);

    let events = tracer.events().drain();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind(), Some(PayloadKind::Request));
    assert_eq!(events[0].payload(), REQUEST);
    assert_eq!(events[0].uid, 1000);
    assert_eq!(events[0].tgid, TRACED);
    assert_eq!(events[1].kind(), Some(PayloadKind::Response));
    assert_eq!(events[1].payload(), b"HTTP/1.1 200 OK\r\n\r\n");
}

#[test]
fn oversized_payload_is_truncated_to_capacity() {
    init_logger();
    let tracer = HttpTracer::new(config::scope(None), 1);
    let memory = HostMemory::new();
    let task = traced();

    let body: Vec<u8> = (0..MAX_DATA_SIZE + 100).map(|i| i as u8).collect();
    let buf = memory.alloc(body.clone());
    tracer.sys_enter_sendto(&task, 3, buf, body.len() as u64);
    tracer.sys_exit_sendto(&task, &memory, body.len() as i64);

    let events = tracer.events().drain();
    assert_eq!(events[0].len as usize, MAX_DATA_SIZE);
    assert_eq!(events[0].payload(), &body[..MAX_DATA_SIZE]);
}

#[test]
fn failed_calls_and_foreign_processes_emit_nothing() {
    init_logger();
    let tracer = HttpTracer::new(config::scope(Some(TRACED)), 1);
    let memory = HostMemory::new();
    let buf = memory.alloc(REQUEST.to_vec());

    let task = traced();
    tracer.sys_enter_sendto(&task, 3, buf, REQUEST.len() as u64);
    tracer.sys_exit_sendto(&task, &memory, -11);
    assert_eq!(tracer.in_flight(), 0);

    let outsider = stranger();
    tracer.sys_enter_sendto(&outsider, 3, buf, REQUEST.len() as u64);
    assert_eq!(tracer.in_flight(), 0);
    tracer.sys_exit_sendto(&outsider, &memory, REQUEST.len() as i64);

    // children of the traced process are in scope
    let child = HostTask::new(5000).child_of(TRACED);
    tracer.sys_enter_sendto(&child, 3, buf, REQUEST.len() as u64);
    tracer.sys_exit_sendto(&child, &memory, REQUEST.len() as i64);

    let events = tracer.events().drain();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].tgid, 5000);
}

#[test]
fn entry_state_is_consumed_exactly_once() {
    init_logger();
    let tracer = HttpTracer::new(config::scope(None), 1);
    let memory = HostMemory::new();
    let task = traced();
    let buf = memory.alloc(REQUEST.to_vec());

    tracer.sys_enter_sendto(&task, 3, buf, REQUEST.len() as u64);
    tracer.sys_exit_sendto(&task, &memory, REQUEST.len() as i64);
    tracer.sys_exit_sendto(&task, &memory, REQUEST.len() as i64);
    assert_eq!(tracer.events().drain().len(), 1);
}

#[test]
fn unreadable_buffer_releases_entry_state() {
    init_logger();
    let tracer = HttpTracer::new(config::scope(None), 1);
    let memory = HostMemory::new();
    let task = traced();

    tracer.sys_enter_recvfrom(&task, 3, 0xdead_0000, 64);
    assert_ne!(tracer.sys_exit_recvfrom(&task, &memory, 64), 0);
    assert_eq!(tracer.in_flight(), 0);
    assert!(tracer.events().drain().is_empty());
}

#[test]
fn tls_payloads_report_the_library_return_value() {
    init_logger();
    let tracer = HttpsTracer::new(config::scope(Some(TRACED)), 1);
    let memory = HostMemory::new();
    let task = traced();

    let body: Vec<u8> = vec![b'x'; MAX_DATA_SIZE + 1];
    let buf = memory.alloc(body.clone());
    tracer.ssl_write(&task, buf);
    tracer.ssl_write_ret(&task, &memory, body.len() as i64);

    let plain = memory.alloc(b"HTTP/1.1 204 No Content\r\n\r\n".to_vec());
    tracer.ssl_read(&task, plain);
    tracer.ssl_read_ret(&task, &memory, 0);
    tracer.ssl_read(&task, plain);
    tracer.ssl_read_ret(&task, &memory, 27);
    assert_eq!(tracer.in_flight(), 0);

    let events = tracer.events().drain();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind(), Some(PayloadKind::Request));
    assert_eq!(events[0].len as usize, MAX_DATA_SIZE + 1);
    assert_eq!(events[0].payload().len(), MAX_DATA_SIZE);
    assert_eq!(events[1].kind(), Some(PayloadKind::Response));
    assert_eq!(events[1].payload(), b"HTTP/1.1 204 No Content\r\n\r\n");
}
