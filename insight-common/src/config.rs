//! Load-time configuration of the tracers.
//!
//! Every record is written once into the kernel program before it is attached and is
//! never mutated afterwards. A `tgid` of zero disables process scoping.

use crate::{ADDR_LEN, DIRECTORY_MAX, MYSQL_DEFAULT_PORT};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeConfig {
    pub tgid: u32,
}

impl ScopeConfig {
    pub const fn new() -> Self {
        Self { tgid: 0 }
    }

    pub const fn scoped_to(tgid: u32) -> Self {
        Self { tgid }
    }
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Destination allow-lists of the connect tracer. Addresses are kept in network byte order.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectConfig {
    pub tgid: u32,
    pub daddr_v4: [u32; ADDR_LEN],
    pub daddr_v4_len: u32,
    pub daddr_v6: [[u8; 16]; ADDR_LEN],
    pub daddr_v6_len: u32,
}

impl ConnectConfig {
    pub const fn new() -> Self {
        Self {
            tgid: 0,
            daddr_v4: [0; ADDR_LEN],
            daddr_v4_len: 0,
            daddr_v6: [[0; 16]; ADDR_LEN],
            daddr_v6_len: 0,
        }
    }

    /// The populated prefix of the IPv4 list.
    pub fn v4(&self) -> &[u32] {
        &self.daddr_v4[..(self.daddr_v4_len as usize).min(ADDR_LEN)]
    }

    pub fn v6(&self) -> &[[u8; 16]] {
        &self.daddr_v6[..(self.daddr_v6_len as usize).min(ADDR_LEN)]
    }
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MysqlConfig {
    pub tgid: u32,
    pub target_port: u16,
    pub _pad: u16,
}

impl MysqlConfig {
    pub const fn new() -> Self {
        Self {
            tgid: 0,
            target_port: MYSQL_DEFAULT_PORT,
            _pad: 0,
        }
    }

    /// A connect is tracked when it targets the well-known port or the configured one.
    pub fn tracks_port(&self, port: u16) -> bool {
        port == MYSQL_DEFAULT_PORT || (self.target_port != 0 && port == self.target_port)
    }
}

impl Default for MysqlConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// `this` is the tgid of the agent owning the interceptor; it and its children are never
/// intercepted. `directory` is a NUL-terminated path prefix.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnlinkConfig {
    pub this: u32,
    pub directory: [u8; DIRECTORY_MAX],
}

impl UnlinkConfig {
    pub const fn new() -> Self {
        Self {
            this: 0,
            directory: [0; DIRECTORY_MAX],
        }
    }
}

impl Default for UnlinkConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for ScopeConfig {}
#[cfg(feature = "user")]
unsafe impl aya::Pod for ConnectConfig {}
#[cfg(feature = "user")]
unsafe impl aya::Pod for MysqlConfig {}
#[cfg(feature = "user")]
unsafe impl aya::Pod for UnlinkConfig {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mysql_port_defaults() {
        let config = MysqlConfig::new();
        assert!(config.tracks_port(3306));
        assert!(!config.tracks_port(3307));

        let config = MysqlConfig {
            target_port: 13306,
            ..MysqlConfig::new()
        };
        assert!(config.tracks_port(3306));
        assert!(config.tracks_port(13306));
    }

    #[test]
    fn allow_list_views_are_clamped() {
        let mut config = ConnectConfig::new();
        config.daddr_v4[0] = 1;
        config.daddr_v4_len = 99;
        assert_eq!(config.v4().len(), 32);
        assert!(config.v6().is_empty());
    }
}
