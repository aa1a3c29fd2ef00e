//! Builders for the load-time configuration records.
//!
//! The records themselves live in [`insight_common::config`] because the kernel
//! programs read them verbatim; this module turns typed input into them and refuses
//! anything the kernel side could not represent.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use insight_common::config::{ConnectConfig, MysqlConfig, ScopeConfig, UnlinkConfig};
use insight_common::{ADDR_LEN, DIRECTORY_MAX, MYSQL_DEFAULT_PORT};

use crate::ConfigError;

/// Scope for the tracers that only filter by process. `None` traces everything.
pub fn scope(tgid: Option<u32>) -> ScopeConfig {
    ScopeConfig::scoped_to(tgid.unwrap_or(0))
}

#[derive(Debug, Clone, Default)]
pub struct ConnectConfigBuilder {
    tgid: Option<u32>,
    v4: Vec<Ipv4Addr>,
    v6: Vec<Ipv6Addr>,
}

impl ConnectConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tgid(mut self, tgid: u32) -> Self {
        self.tgid = Some(tgid);
        self
    }

    pub fn allow_v4(mut self, addr: Ipv4Addr) -> Self {
        self.v4.push(addr);
        self
    }

    pub fn allow_v6(mut self, addr: Ipv6Addr) -> Self {
        self.v6.push(addr);
        self
    }

    pub fn build(self) -> Result<ConnectConfig, ConfigError> {
        if self.v4.len() > ADDR_LEN {
            return Err(ConfigError::TooManyV4 {
                got: self.v4.len(),
                max: ADDR_LEN,
            });
        }
        if self.v6.len() > ADDR_LEN {
            return Err(ConfigError::TooManyV6 {
                got: self.v6.len(),
                max: ADDR_LEN,
            });
        }

        let mut config = ConnectConfig::new();
        config.tgid = self.tgid.unwrap_or(0);
        for (slot, addr) in config.daddr_v4.iter_mut().zip(&self.v4) {
            // the kernel compares against skc_daddr, which is in network byte order
            *slot = u32::from_ne_bytes(addr.octets());
        }
        config.daddr_v4_len = self.v4.len() as u32;
        for (slot, addr) in config.daddr_v6.iter_mut().zip(&self.v6) {
            *slot = addr.octets();
        }
        config.daddr_v6_len = self.v6.len() as u32;
        Ok(config)
    }
}

/// `port` is tracked in addition to the well-known MySQL port.
pub fn mysql(tgid: Option<u32>, port: Option<u16>) -> Result<MysqlConfig, ConfigError> {
    let target_port = port.unwrap_or(MYSQL_DEFAULT_PORT);
    if target_port == 0 {
        return Err(ConfigError::ZeroPort);
    }
    Ok(MysqlConfig {
        tgid: tgid.unwrap_or(0),
        target_port,
        ..MysqlConfig::new()
    })
}

/// `this` is the tgid of the agent that owns the interceptor.
pub fn unlink(this: u32, directory: &Path) -> Result<UnlinkConfig, ConfigError> {
    let bytes = directory.as_os_str().as_bytes();
    if bytes.is_empty() {
        return Err(ConfigError::EmptyDirectory);
    }
    if bytes.contains(&0) {
        return Err(ConfigError::DirectoryContainsNul);
    }
    if bytes.len() >= DIRECTORY_MAX {
        return Err(ConfigError::DirectoryTooLong {
            len: bytes.len(),
            max: DIRECTORY_MAX - 1,
        });
    }

    let mut config = UnlinkConfig::new();
    config.this = this;
    config.directory[..bytes.len()].copy_from_slice(bytes);
    Ok(config)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn connect_lists_are_bounded() {
        let mut builder = ConnectConfigBuilder::new();
        for i in 0..=ADDR_LEN {
            builder = builder.allow_v4(Ipv4Addr::new(10, 0, 0, i as u8));
        }
        assert_eq!(
            builder.build(),
            Err(ConfigError::TooManyV4 { got: 33, max: 32 })
        );
    }

    #[test]
    fn connect_addresses_are_network_order() {
        let config = ConnectConfigBuilder::new()
            .tgid(4)
            .allow_v4(Ipv4Addr::new(127, 0, 0, 1))
            .allow_v6(Ipv6Addr::LOCALHOST)
            .build()
            .unwrap();
        assert_eq!(config.tgid, 4);
        assert_eq!(config.v4(), &[u32::from_ne_bytes([127, 0, 0, 1])]);
        assert_eq!(config.v6(), &[Ipv6Addr::LOCALHOST.octets()]);
    }

    #[test]
    fn mysql_port() {
        assert_eq!(mysql(None, None).unwrap().target_port, 3306);
        assert_eq!(mysql(Some(9), Some(13306)).unwrap().tgid, 9);
        assert_eq!(mysql(None, Some(0)), Err(ConfigError::ZeroPort));
    }

    #[test]
    fn unlink_directory() {
        let config = unlink(77, Path::new("/var/log/fluentd/")).unwrap();
        assert_eq!(config.this, 77);
        assert!(config.directory.starts_with(b"/var/log/fluentd/\0"));

        assert_eq!(unlink(1, Path::new("")), Err(ConfigError::EmptyDirectory));
        let long = "/".repeat(DIRECTORY_MAX);
        assert_eq!(
            unlink(1, Path::new(&long)),
            Err(ConfigError::DirectoryTooLong { len: 128, max: 127 })
        );
    }
}
