//! Stand-ins for what the kernel hands a probe: the current task, the traced process'
//! memory, the probed function's registers, sockets and open files.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use insight_common::event::Protocol;
use insight_common::pipeline::{
    CurrentTask, Destination, OpenFile, ResolvePath, ReturnOverride, SocketReader, TaskInfo,
    UserMemory,
};
use insight_common::InsightError::{CouldntGetPath, CouldntReadKernel, CouldntReadUser};
use insight_common::{InsightError, FILENAME_LEN, TASK_COMM_LEN};

const ENAMETOOLONG: i64 = -36;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTask {
    pub tgid: u32,
    pub pid: u32,
    pub parent_tgid: u32,
    pub uid: u32,
    pub comm: [u8; TASK_COMM_LEN],
    pub cpu: usize,
    pub now_ns: u64,
}

impl HostTask {
    /// The main thread of process `tgid`.
    pub fn new(tgid: u32) -> Self {
        Self {
            tgid,
            pid: tgid,
            parent_tgid: 1,
            uid: 0,
            comm: [0; TASK_COMM_LEN],
            cpu: 0,
            now_ns: 0,
        }
    }

    pub fn thread(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn child_of(mut self, parent_tgid: u32) -> Self {
        self.parent_tgid = parent_tgid;
        self
    }

    pub fn uid(mut self, uid: u32) -> Self {
        self.uid = uid;
        self
    }

    /// Truncated to the kernel's `TASK_COMM_LEN - 1` bytes.
    pub fn comm(mut self, comm: &str) -> Self {
        let len = comm.len().min(TASK_COMM_LEN - 1);
        self.comm = [0; TASK_COMM_LEN];
        self.comm[..len].copy_from_slice(&comm.as_bytes()[..len]);
        self
    }

    pub fn on_cpu(mut self, cpu: usize) -> Self {
        self.cpu = cpu;
        self
    }

    pub fn at(mut self, now_ns: u64) -> Self {
        self.now_ns = now_ns;
        self
    }
}

impl TaskInfo for HostTask {
    fn tgid(&self) -> Result<u32, InsightError> {
        Ok(self.tgid)
    }

    fn pid(&self) -> Result<u32, InsightError> {
        Ok(self.pid)
    }

    fn parent_tgid(&self) -> Result<u32, InsightError> {
        Ok(self.parent_tgid)
    }

    fn comm(&self) -> Result<[u8; TASK_COMM_LEN], InsightError> {
        Ok(self.comm)
    }
}

impl CurrentTask for HostTask {
    fn uid(&self) -> u32 {
        self.uid
    }

    fn ktime_ns(&self) -> u64 {
        self.now_ns
    }
}

/// Mapped regions of a traced process. Reads that are not fully inside one region fail
/// the way a fault in `bpf_probe_read_user` does.
pub struct HostMemory {
    regions: RwLock<BTreeMap<u64, Vec<u8>>>,
    next: AtomicU64,
}

impl Default for HostMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl HostMemory {
    const BASE: u64 = 0x7f00_0000_0000;
    const PAGE: u64 = 0x1000;

    pub fn new() -> Self {
        Self {
            regions: RwLock::new(BTreeMap::new()),
            next: AtomicU64::new(Self::BASE),
        }
    }

    pub fn map(&self, addr: u64, bytes: impl Into<Vec<u8>>) {
        self.regions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(addr, bytes.into());
    }

    /// Maps `bytes` at a fresh page-aligned address, leaving an unmapped page after it.
    pub fn alloc(&self, bytes: impl Into<Vec<u8>>) -> u64 {
        let bytes = bytes.into();
        let pages = (bytes.len() as u64).div_ceil(Self::PAGE) + 1;
        let addr = self.next.fetch_add(pages * Self::PAGE, Ordering::Relaxed);
        self.map(addr, bytes);
        addr
    }

    pub fn unmap(&self, addr: u64) {
        self.regions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&addr);
    }

    /// Runs `f` on the mapped bytes from `addr` to the end of its region.
    fn with_region<R>(&self, addr: u64, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        let regions = self.regions.read().unwrap_or_else(PoisonError::into_inner);
        let (start, bytes) = regions.range(..=addr).next_back()?;
        let offset = usize::try_from(addr - start).ok()?;
        let tail = bytes.get(offset..)?;
        if tail.is_empty() {
            return None;
        }
        Some(f(tail))
    }
}

impl UserMemory for HostMemory {
    fn read_user(&self, src: u64, dest: &mut [u8]) -> Result<(), InsightError> {
        if dest.is_empty() {
            return Ok(());
        }
        self.with_region(src, |tail| {
            let bytes = tail.get(..dest.len())?;
            dest.copy_from_slice(bytes);
            Some(())
        })
        .flatten()
        .ok_or(CouldntReadUser("read_user", src, dest.len()))
    }

    fn read_user_str(&self, src: u64, dest: &mut [u8]) -> Result<usize, InsightError> {
        let Some(limit) = dest.len().checked_sub(1) else {
            return Ok(0);
        };
        self.with_region(src, |tail| {
            let len = match tail.iter().take(limit).position(|&b| b == 0) {
                Some(nul) => nul,
                None if tail.len() >= limit => limit,
                // ran off the end of the mapping before a terminator
                None => return None,
            };
            dest[..len].copy_from_slice(&tail[..len]);
            dest[len] = 0;
            Some(len + 1)
        })
        .flatten()
        .ok_or(CouldntReadUser("read_user_str", src, dest.len()))
    }
}

/// Records the return value forced by an override instead of applying it.
#[derive(Default)]
pub struct ForcedReturn(Mutex<Option<u64>>);

impl ForcedReturn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<u64> {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ReturnOverride for ForcedReturn {
    fn override_return(&self, rc: u64) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(rc);
    }
}

/// Kernel sockets by address.
#[derive(Default)]
pub struct HostSockets(RwLock<HashMap<u64, Destination>>);

impl HostSockets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, sock: u64, destination: Destination) {
        self.0
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(sock, destination);
    }
}

impl SocketReader for HostSockets {
    fn destination(&self, sock: u64, _protocol: Protocol) -> Result<Destination, InsightError> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&sock)
            .copied()
            .ok_or(CouldntReadKernel(
                "sock",
                sock,
                std::mem::size_of::<Destination>(),
            ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFile {
    pub identity: u64,
    pub regular: bool,
    pub path: String,
}

impl HostFile {
    pub fn regular(identity: u64, path: &str) -> Self {
        Self {
            identity,
            regular: true,
            path: path.to_owned(),
        }
    }

    /// A pipe, socket or device.
    pub fn special(identity: u64, path: &str) -> Self {
        Self {
            regular: false,
            ..Self::regular(identity, path)
        }
    }
}

fn copy_truncated(src: &[u8], dest: &mut [u8; FILENAME_LEN]) {
    let len = src.len().min(FILENAME_LEN - 1);
    dest[..len].copy_from_slice(&src[..len]);
    dest[len] = 0;
}

impl OpenFile for HostFile {
    fn identity(&self) -> u64 {
        self.identity
    }

    fn is_regular(&self) -> Result<bool, InsightError> {
        Ok(self.regular)
    }

    fn read_basename(&self, dest: &mut [u8; FILENAME_LEN]) -> Result<(), InsightError> {
        let name = self.path.rsplit('/').next().unwrap_or_default();
        copy_truncated(name.as_bytes(), dest);
        Ok(())
    }
}

impl ResolvePath for HostFile {
    fn resolve_path(&self, dest: &mut [u8; FILENAME_LEN]) -> Result<(), InsightError> {
        if self.path.len() >= FILENAME_LEN {
            return Err(CouldntGetPath("d_path", ENAMETOOLONG));
        }
        copy_truncated(self.path.as_bytes(), dest);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reads_must_stay_inside_a_region() {
        let memory = HostMemory::new();
        let addr = memory.alloc(b"hello".to_vec());

        let mut buf = [0u8; 5];
        memory.read_user(addr, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        let mut buf = [0u8; 3];
        memory.read_user(addr + 2, &mut buf).unwrap();
        assert_eq!(&buf, b"llo");

        let mut buf = [0u8; 6];
        assert!(memory.read_user(addr, &mut buf).is_err());
        assert!(memory.read_user(addr + 5, &mut [0u8; 1]).is_err());
        assert!(memory.read_user(0x10, &mut [0u8; 1]).is_err());
    }

    #[test]
    fn string_reads_terminate() {
        let memory = HostMemory::new();
        let addr = memory.alloc(b"/tmp/file\0junk".to_vec());

        let mut buf = [0xffu8; 32];
        assert_eq!(memory.read_user_str(addr, &mut buf).unwrap(), 10);
        assert_eq!(&buf[..10], b"/tmp/file\0");

        let mut short = [0xffu8; 5];
        assert_eq!(memory.read_user_str(addr, &mut short).unwrap(), 5);
        assert_eq!(&short, b"/tmp\0");

        let unterminated = memory.alloc(b"abc".to_vec());
        assert!(memory.read_user_str(unterminated, &mut buf).is_err());
    }

    #[test]
    fn basename_and_full_path() {
        let file = HostFile::regular(1, "/home/user/project/main.c");
        let mut buf = [0u8; FILENAME_LEN];
        file.read_basename(&mut buf).unwrap();
        assert!(buf.starts_with(b"main.c\0"));
        file.resolve_path(&mut buf).unwrap();
        assert!(buf.starts_with(b"/home/user/project/main.c\0"));

        let long = HostFile::regular(2, &format!("/{}", "a".repeat(FILENAME_LEN)));
        assert!(long.resolve_path(&mut buf).is_err());
        long.read_basename(&mut buf).unwrap();
        assert_eq!(buf[FILENAME_LEN - 1], 0);
    }
}
