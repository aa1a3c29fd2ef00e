#![allow(dead_code)]

use insight::task::{HostMemory, HostTask};

pub const TRACED: u32 = 4242;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn traced() -> HostTask {
    HostTask::new(TRACED).comm("traced")
}

pub fn stranger() -> HostTask {
    HostTask::new(9000).comm("stranger")
}

/// A `sockaddr_in` as a process passes it to `connect`.
pub fn sockaddr_in(memory: &HostMemory, addr: [u8; 4], port: u16) -> u64 {
    let mut raw = Vec::with_capacity(16);
    raw.extend_from_slice(&2u16.to_ne_bytes());
    raw.extend_from_slice(&port.to_be_bytes());
    raw.extend_from_slice(&addr);
    raw.extend_from_slice(&[0; 8]);
    memory.alloc(raw)
}

/// One MySQL frame: 3-byte little-endian length, sequence id, body.
pub fn frame(sequence_id: u8, body: &[u8]) -> Vec<u8> {
    let len = body.len() as u32;
    let mut raw = vec![len as u8, (len >> 8) as u8, (len >> 16) as u8, sequence_id];
    raw.extend_from_slice(body);
    raw
}
