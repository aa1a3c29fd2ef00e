//! Scope and content filters. Everything here is bounded so the kernel programs can
//! inline it unchanged.

use crate::config::{ConnectConfig, UnlinkConfig};
use crate::{DIRECTORY_MAX, FILENAME_LEN};

/// Pseudo-filesystems and mounts that are never worth reporting.
const EXCLUDED_PREFIXES: [&[u8]; 5] = [b"/proc/", b"/sys/", b"/dev/", b"/run/", b"/host/"];

const CACHE_SEGMENT: &[u8] = b"/.cache/";

/// Whether a task belongs to the traced process tree. A zero target traces everything.
#[inline(always)]
pub fn in_scope(tgid: u32, parent_tgid: u32, target: u32) -> bool {
    target == 0 || tgid == target || parent_tgid == target
}

/// The unlink interceptor never touches its own agent or the agent's children.
#[inline(always)]
pub fn is_own_process(tgid: u32, parent_tgid: u32, this: u32) -> bool {
    this == tgid || this == parent_tgid
}

#[inline(always)]
pub fn filter_daddr_v4(config: &ConnectConfig, daddr: u32) -> bool {
    let len = config.daddr_v4_len as usize;
    if len == 0 {
        return true;
    }
    for i in 0..config.daddr_v4.len() {
        if i >= len {
            break;
        }
        if config.daddr_v4[i] == daddr {
            return true;
        }
    }
    false
}

#[inline(always)]
pub fn filter_daddr_v6(config: &ConnectConfig, daddr: &[u8; 16]) -> bool {
    let len = config.daddr_v6_len as usize;
    if len == 0 {
        return true;
    }
    for i in 0..config.daddr_v6.len() {
        if i >= len {
            break;
        }
        if config.daddr_v6[i] == *daddr {
            return true;
        }
    }
    false
}

#[inline(always)]
pub fn starts_with(path: &[u8], prefix: &[u8]) -> bool {
    if prefix.len() > path.len() {
        return false;
    }
    for i in 0..prefix.len() {
        if path[i] != prefix[i] {
            return false;
        }
    }
    true
}

/// Whether a resolved path should be dropped: noisy pseudo-filesystems, or any path
/// containing a `/.cache/` segment.
#[inline(always)]
pub fn should_filter_path(path: &[u8; FILENAME_LEN]) -> bool {
    for prefix in EXCLUDED_PREFIXES {
        if starts_with(path, prefix) {
            return true;
        }
    }

    for i in 0..FILENAME_LEN - CACHE_SEGMENT.len() {
        if path[i] == 0 {
            break;
        }
        if starts_with(&path[i..], CACHE_SEGMENT) {
            return true;
        }
    }
    false
}

/// Byte-wise prefix compare against the configured directory; the comparison stops
/// at the directory's terminator.
#[inline(always)]
pub fn filter_directory(config: &UnlinkConfig, pathname: &[u8]) -> bool {
    for i in 0..DIRECTORY_MAX {
        let expected = config.directory[i];
        if expected == 0 {
            break;
        }
        match pathname.get(i) {
            Some(&actual) if actual == expected => {}
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod test {
    use super::*;

    fn path(s: &str) -> [u8; FILENAME_LEN] {
        let mut buf = [0; FILENAME_LEN];
        buf[..s.len()].copy_from_slice(s.as_bytes());
        buf
    }

    fn unlink_config(dir: &str) -> UnlinkConfig {
        let mut config = UnlinkConfig::new();
        config.directory[..dir.len()].copy_from_slice(dir.as_bytes());
        config
    }

    #[test]
    fn excludes_pseudo_filesystems_and_caches() {
        assert!(should_filter_path(&path("/proc/self/status")));
        assert!(should_filter_path(&path("/sys/kernel/x")));
        assert!(should_filter_path(&path("/home/user/.cache/foo")));
        assert!(should_filter_path(&path("/dev/null")));
        assert!(should_filter_path(&path("/run/lock")));
        assert!(should_filter_path(&path("/host/etc/hosts")));
        assert!(!should_filter_path(&path("/home/user/project/main.c")));
        assert!(!should_filter_path(&path("/home/user/.cached/foo")));
        assert!(!should_filter_path(&path("/procfs")));
    }

    #[test]
    fn cache_segment_must_be_terminated_by_slash() {
        assert!(!should_filter_path(&path("/home/user/.cache")));
        assert!(should_filter_path(&path("/.cache/")));
    }

    #[test]
    fn scope() {
        assert!(in_scope(10, 1, 0));
        assert!(in_scope(10, 1, 10));
        assert!(in_scope(11, 10, 10));
        assert!(!in_scope(12, 11, 10));
    }

    #[test]
    fn own_process() {
        assert!(is_own_process(7, 1, 7));
        assert!(is_own_process(8, 7, 7));
        assert!(!is_own_process(9, 8, 7));
    }

    #[test]
    fn address_allow_lists() {
        let mut config = ConnectConfig::new();
        assert!(filter_daddr_v4(&config, 0x0100_007f));
        assert!(filter_daddr_v6(&config, &[1; 16]));

        config.daddr_v4[0] = 0x0100_007f;
        config.daddr_v4_len = 1;
        assert!(filter_daddr_v4(&config, 0x0100_007f));
        assert!(!filter_daddr_v4(&config, 0x0200_007f));
        // entries past the length are ignored
        config.daddr_v4[1] = 0x0200_007f;
        assert!(!filter_daddr_v4(&config, 0x0200_007f));

        config.daddr_v6[0] = [2; 16];
        config.daddr_v6_len = 1;
        assert!(filter_daddr_v6(&config, &[2; 16]));
        assert!(!filter_daddr_v6(&config, &[1; 16]));
    }

    #[test]
    fn directory_prefix() {
        let config = unlink_config("/var/log/fluentd/");
        assert!(filter_directory(&config, b"/var/log/fluentd/buffer.log\0"));
        assert!(!filter_directory(&config, b"/var/log/other.log\0"));
        assert!(!filter_directory(&config, b"/var/log\0"));
        assert!(!filter_directory(&config, b"/var"));

        let everything = UnlinkConfig::new();
        assert!(filter_directory(&everything, b"/etc/passwd\0"));
    }
}
