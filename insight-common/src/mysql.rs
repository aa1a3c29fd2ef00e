//! Per-connection MySQL classification.
//!
//! A connection starts in [`ConnState::Connecting`] when a connect to the MySQL port is
//! observed and walks through the handshake as payloads are seen on its descriptor.
//! Payloads are judged one syscall at a time; there is no stream reassembly.

use crate::event::Direction;
use crate::MAX_DATA_SIZE;

pub const HANDSHAKE_V10: u8 = 0x0a;
pub const OK_MARKER: u8 = 0x00;
pub const ERR_MARKER: u8 = 0xff;

/// Bytes of the frame header: a 3-byte little-endian length and the sequence id.
pub const HEADER_LEN: usize = 4;

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "user", derive(strum_macros::IntoStaticStr))]
pub enum ConnState {
    Connecting = 0,
    ServerGreeting = 1,
    ClientAuth = 2,
    Established = 3,
    Invalid = 4,
}

impl ConnState {
    fn from_raw(raw: u32) -> Self {
        match raw {
            0 => ConnState::Connecting,
            1 => ConnState::ServerGreeting,
            2 => ConnState::ClientAuth,
            3 => ConnState::Established,
            _ => ConnState::Invalid,
        }
    }
}

/// Classification state of one tracked descriptor.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub fd: i32,
    /// Sequence id of the last emitted payload.
    pub sequence_id: u8,
    /// Set once the server accepted the client's authentication.
    pub is_mysql: u8,
    pub port: u16,
    state: u32,
    /// Sequence id of the last payload that advanced or refreshed the handshake.
    pub last_sequence_id: u8,
    pub _pad: [u8; 3],
}

/// What the caller should do with an observed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Emit { sequence_id: u8 },
    Drop,
}

/// The 3-byte little-endian length prefix of a frame.
#[inline(always)]
pub fn frame_length(payload: &[u8]) -> Option<u32> {
    if payload.len() < HEADER_LEN {
        return None;
    }
    Some(payload[0] as u32 | ((payload[1] as u32) << 8) | ((payload[2] as u32) << 16))
}

/// Coarse shape check: a nonzero frame length no larger than the capture buffer.
#[inline(always)]
pub fn is_mysql_packet(payload: &[u8]) -> bool {
    match frame_length(payload) {
        Some(len) => len != 0 && len as usize <= MAX_DATA_SIZE,
        None => false,
    }
}

impl ConnectionInfo {
    pub const fn connecting(fd: i32, port: u16) -> Self {
        Self {
            fd,
            sequence_id: 0,
            is_mysql: 0,
            port,
            state: ConnState::Connecting as u32,
            last_sequence_id: 0,
            _pad: [0; 3],
        }
    }

    pub fn state(&self) -> ConnState {
        ConnState::from_raw(self.state)
    }

    pub fn is_mysql(&self) -> bool {
        self.is_mysql != 0
    }

    fn set_state(&mut self, state: ConnState) {
        self.state = state as u32;
    }

    /// Feeds one captured payload through the state machine.
    ///
    /// Implausible frames demote a connection that is still `Connecting` to `Invalid`
    /// and are otherwise ignored without a state change. Nothing is emitted once the
    /// connection is `Invalid`.
    pub fn observe(&mut self, payload: &[u8], direction: Direction) -> Observation {
        if self.state() == ConnState::Invalid {
            return Observation::Drop;
        }

        if !is_mysql_packet(payload) {
            if self.state() == ConnState::Connecting {
                self.set_state(ConnState::Invalid);
            }
            return Observation::Drop;
        }

        let sequence_id = payload[3];
        self.advance(payload, sequence_id, direction);

        if self.state() == ConnState::Invalid {
            return Observation::Drop;
        }
        self.sequence_id = sequence_id;
        Observation::Emit { sequence_id }
    }

    fn advance(&mut self, payload: &[u8], sequence_id: u8, direction: Direction) {
        let from_server = direction == Direction::ServerToClient;
        let marker = payload.get(HEADER_LEN).copied();

        match self.state() {
            ConnState::Connecting => {
                if from_server
                    && sequence_id == 0
                    && payload.len() > 10
                    && marker == Some(HANDSHAKE_V10)
                {
                    self.set_state(ConnState::ServerGreeting);
                    self.last_sequence_id = sequence_id;
                }
            }
            ConnState::ServerGreeting => {
                if !from_server && sequence_id == 1 {
                    self.set_state(ConnState::ClientAuth);
                    self.last_sequence_id = sequence_id;
                }
            }
            ConnState::ClientAuth => {
                if from_server && payload.len() > HEADER_LEN {
                    if marker == Some(OK_MARKER) {
                        self.set_state(ConnState::Established);
                        self.is_mysql = 1;
                        self.last_sequence_id = sequence_id;
                    } else if marker == Some(ERR_MARKER) {
                        self.set_state(ConnState::Invalid);
                        self.is_mysql = 0;
                    }
                }
            }
            ConnState::Established => self.last_sequence_id = sequence_id,
            ConnState::Invalid => {}
        }
    }
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for ConnectionInfo {}
