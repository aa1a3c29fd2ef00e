mod common;

use common::{frame, init_logger, sockaddr_in, stranger, traced, TRACED};
use insight::config;
use insight::task::{HostMemory, HostTask};
use insight::tracer::MysqlTracer;
use insight_common::event::Direction;
use insight_common::mysql::ConnState;

const FD: i32 = 7;

struct Session<'a> {
    tracer: &'a MysqlTracer,
    memory: &'a HostMemory,
    task: HostTask,
}

impl Session<'_> {
    fn connect(&self, port: u16) {
        let uaddr = sockaddr_in(self.memory, [10, 0, 0, 5], port);
        self.tracer.sys_enter_connect(&self.task, self.memory, FD, uaddr);
    }

    fn send(&self, payload: &[u8]) {
        let buf = self.memory.alloc(payload.to_vec());
        self.tracer
            .sys_enter_sendto(&self.task, FD, buf, payload.len() as u64);
        self.tracer
            .sys_exit_sendto(&self.task, self.memory, payload.len() as i64);
    }

    fn recv(&self, payload: &[u8]) {
        let buf = self.memory.alloc(payload.to_vec());
        self.tracer
            .sys_enter_recvfrom(&self.task, FD, buf, 4096);
        self.tracer
            .sys_exit_recvfrom(&self.task, self.memory, payload.len() as i64);
    }

    fn state(&self) -> Option<ConnState> {
        self.tracer.connection(FD).map(|conn| conn.state())
    }
}

fn greeting() -> Vec<u8> {
    let mut body = vec![0x0a];
    body.extend_from_slice(b"8.0.36\0");
    body.extend_from_slice(&[0; 8]);
    frame(0, &body)
}

fn auth() -> Vec<u8> {
    frame(1, b"\x85\xa6\xff\x01root\0")
}

fn ok(sequence_id: u8) -> Vec<u8> {
    frame(sequence_id, &[0x00, 0x00, 0x00, 0x02, 0x00])
}

fn err(sequence_id: u8) -> Vec<u8> {
    frame(sequence_id, b"\xff\x15\x04#28000Access denied")
}

fn tracer() -> MysqlTracer {
    MysqlTracer::new(config::mysql(Some(TRACED), None).unwrap(), 1)
}

#[test]
fn handshake_establishes_and_emits_every_step() {
    init_logger();
    let tracer = tracer();
    let memory = HostMemory::new();
    let session = Session {
        tracer: &tracer,
        memory: &memory,
        task: traced(),
    };

    session.connect(3306);
    assert_eq!(session.state(), Some(ConnState::Connecting));
    session.recv(&greeting());
    session.send(&auth());
    session.recv(&ok(2));
    session.send(&frame(0, b"\x03SELECT 1"));

    let conn = tracer.connection(FD).unwrap();
    assert_eq!(conn.state(), ConnState::Established);
    assert!(conn.is_mysql());

    let events = tracer.events().drain();
    let directions: Vec<_> = events.iter().map(|e| e.direction().unwrap()).collect();
    assert_eq!(
        directions,
        [
            Direction::ServerToClient,
            Direction::ClientToServer,
            Direction::ServerToClient,
            Direction::ClientToServer,
        ]
    );
    let sequence_ids: Vec<_> = events.iter().map(|e| e.sequence_id).collect();
    assert_eq!(sequence_ids, [0, 1, 2, 0]);
    assert_eq!(events[3].payload(), &frame(0, b"\x03SELECT 1")[..]);
    assert!(events.iter().all(|e| e.fd == FD && e.tgid == TRACED));
}

#[test]
fn rejected_auth_invalidates_and_silences() {
    init_logger();
    let tracer = tracer();
    let memory = HostMemory::new();
    let session = Session {
        tracer: &tracer,
        memory: &memory,
        task: traced(),
    };

    session.connect(3306);
    session.recv(&greeting());
    session.send(&auth());
    session.recv(&err(2));

    let conn = tracer.connection(FD).unwrap();
    assert_eq!(conn.state(), ConnState::Invalid);
    assert!(!conn.is_mysql());

    session.send(&frame(0, b"\x03SELECT 1"));
    assert_eq!(tracer.events().drain().len(), 2);
}

#[test]
fn garbage_before_greeting_is_not_mysql() {
    init_logger();
    let tracer = tracer();
    let memory = HostMemory::new();
    let session = Session {
        tracer: &tracer,
        memory: &memory,
        task: traced(),
    };

    session.connect(3306);
    session.recv(&[0, 0, 0, 0, 0x0a]);
    assert_eq!(session.state(), Some(ConnState::Invalid));
    session.recv(&greeting());
    assert!(tracer.events().drain().is_empty());
}

#[test]
fn implausible_payload_after_handshake_is_dropped() {
    init_logger();
    let tracer = tracer();
    let memory = HostMemory::new();
    let session = Session {
        tracer: &tracer,
        memory: &memory,
        task: traced(),
    };

    session.connect(3306);
    session.recv(&greeting());
    session.send(&auth());
    session.recv(&ok(2));
    let before = tracer.connection(FD).unwrap();
    let _ = tracer.events().drain();

    session.send(b"GET / HTTP/1.1\r\n");
    assert_eq!(tracer.connection(FD), Some(before));
    assert!(tracer.events().drain().is_empty());
}

#[test]
fn close_then_reconnect_starts_fresh() {
    init_logger();
    let tracer = tracer();
    let memory = HostMemory::new();
    let session = Session {
        tracer: &tracer,
        memory: &memory,
        task: traced(),
    };

    session.connect(3306);
    session.recv(&[0, 0, 0, 0]);
    assert_eq!(session.state(), Some(ConnState::Invalid));

    tracer.sys_enter_close(&session.task, FD);
    assert_eq!(session.state(), None);

    session.connect(3306);
    assert_eq!(session.state(), Some(ConnState::Connecting));
    session.recv(&greeting());
    assert_eq!(session.state(), Some(ConnState::ServerGreeting));
    assert_eq!(tracer.events().drain().len(), 1);
}

#[test]
fn only_mysql_ports_in_scope_are_tracked() {
    init_logger();
    let tracer = MysqlTracer::new(config::mysql(Some(TRACED), Some(13306)).unwrap(), 1);
    let memory = HostMemory::new();

    let session = Session {
        tracer: &tracer,
        memory: &memory,
        task: traced(),
    };
    session.connect(5432);
    assert_eq!(session.state(), None);
    session.connect(13306);
    assert_eq!(session.state(), Some(ConnState::Connecting));

    let outsider = Session {
        tracer: &tracer,
        memory: &memory,
        task: stranger(),
    };
    tracer.sys_enter_close(&outsider.task, FD);
    outsider.connect(3306);
    assert_eq!(outsider.state(), None);
}

#[test]
fn untracked_descriptor_is_ignored() {
    init_logger();
    let tracer = tracer();
    let memory = HostMemory::new();
    let session = Session {
        tracer: &tracer,
        memory: &memory,
        task: traced(),
    };

    session.recv(&greeting());
    assert!(tracer.events().drain().is_empty());
}

#[test]
fn same_descriptor_in_another_process_is_ignored() {
    init_logger();
    let tracer = tracer();
    let memory = HostMemory::new();
    let session = Session {
        tracer: &tracer,
        memory: &memory,
        task: traced(),
    };
    session.connect(3306);
    session.recv(&greeting());
    let before = tracer.connection(FD).unwrap();
    let _ = tracer.events().drain();

    let outsider = Session {
        tracer: &tracer,
        memory: &memory,
        task: stranger(),
    };
    outsider.send(&frame(0, b"\x03SELECT secret"));
    outsider.recv(&ok(1));

    assert!(tracer.events().drain().is_empty());
    assert_eq!(tracer.connection(FD), Some(before));
}
