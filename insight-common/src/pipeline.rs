//! Capabilities the tracers are written against.
//!
//! The hook logic in [`crate::probe`] only talks to these traits. The kernel programs
//! back them with BPF maps and helpers; the host crate backs them with ordinary
//! concurrent data structures so the same logic can be driven from tests.

use core::ops::{Deref, DerefMut};

use crate::event::{PathEntry, Protocol};
use crate::filter::in_scope;
use crate::{InsightError, FILENAME_LEN, TASK_COMM_LEN};

/// Types for which the all-zero bit pattern is a valid value.
///
/// # Safety
///
/// Implementors must be plain data without references, niches or invariants.
pub unsafe trait Zeroable: Sized {
    fn zeroed() -> Self {
        unsafe { core::mem::zeroed() }
    }
}

/// A bounded keyed store bridging a call-entry hook to the matching exit hook.
///
/// Writers overwrite (last writer wins); the exit hook that consumes an entry is the
/// one that deletes it.
pub trait CorrelationTable<K, V: Copy> {
    fn record(&self, key: &K, value: &V) -> Result<(), InsightError>;

    fn lookup(&self, key: &K) -> Option<V>;

    /// Removing an absent key is not an error.
    fn remove(&self, key: &K);

    /// Claims the entry for `key`. The entry is deleted when the returned guard is
    /// dropped, whichever way the caller leaves.
    #[inline(always)]
    fn take(&self, key: K) -> Option<Correlated<'_, K, V, Self>>
    where
        Self: Sized,
    {
        let value = self.lookup(&key)?;
        Some(Correlated {
            table: self,
            key,
            value,
        })
    }
}

/// Entry claimed from a [`CorrelationTable`]; deletes it on drop.
pub struct Correlated<'t, K, V, T>
where
    V: Copy,
    T: CorrelationTable<K, V>,
{
    table: &'t T,
    key: K,
    value: V,
}

impl<K, V, T> Correlated<'_, K, V, T>
where
    V: Copy,
    T: CorrelationTable<K, V>,
{
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K, V, T> Deref for Correlated<'_, K, V, T>
where
    V: Copy,
    T: CorrelationTable<K, V>,
{
    type Target = V;

    fn deref(&self) -> &V {
        &self.value
    }
}

impl<K, V, T> Drop for Correlated<'_, K, V, T>
where
    V: Copy,
    T: CorrelationTable<K, V>,
{
    fn drop(&mut self) {
        self.table.remove(&self.key);
    }
}

/// An output channel for records of type `T`.
pub trait EventSink<T> {
    type Slot<'s>: EventSlot<T>
    where
        Self: 's;

    /// Acquires staging space for one record. `None` means the channel or the staging
    /// area is exhausted and the event must be dropped.
    fn reserve(&self) -> Option<Self::Slot<'_>>;
}

/// Staging space for one record. A slot dropped without `commit` is discarded.
pub trait EventSlot<T>: DerefMut<Target = T> {
    fn commit(self);

    fn discard(self);
}

/// Maps an open file's identity to the path resolved when it was opened.
pub trait PathCache {
    fn insert(&self, file: u64, entry: &PathEntry) -> Result<(), InsightError>;

    /// Copies the cached path into `dest`. Returns `false` on a miss.
    fn copy_into(&self, file: u64, dest: &mut [u8; FILENAME_LEN]) -> bool;
}

/// Per thread-group latency histograms.
pub trait HistogramTable {
    /// Bumps `slot` of the histogram of `tgid`, creating it with the name produced by
    /// `comm` if it does not exist yet.
    fn increment<F>(&self, tgid: u32, slot: usize, comm: F) -> Result<(), InsightError>
    where
        F: FnOnce() -> Result<[u8; TASK_COMM_LEN], InsightError>;
}

/// Identity of a task. Foreign tasks are read out of kernel memory, so every accessor
/// may fail.
pub trait TaskInfo {
    fn tgid(&self) -> Result<u32, InsightError>;
    fn pid(&self) -> Result<u32, InsightError>;
    fn parent_tgid(&self) -> Result<u32, InsightError>;
    fn comm(&self) -> Result<[u8; TASK_COMM_LEN], InsightError>;
}

/// The task a hook is running on behalf of.
pub trait CurrentTask: TaskInfo {
    fn uid(&self) -> u32;
    fn ktime_ns(&self) -> u64;
}

pub trait UserMemory {
    fn read_user(&self, src: u64, dest: &mut [u8]) -> Result<(), InsightError>;

    /// Copies a NUL-terminated string, truncating to `dest`. Returns the number of
    /// bytes written including the terminator.
    fn read_user_str(&self, src: u64, dest: &mut [u8]) -> Result<usize, InsightError>;
}

/// Replaces the return value of the probed function; the function body never runs.
pub trait ReturnOverride {
    fn override_return(&self, rc: u64);
}

/// Destination of a connected socket, as stored by the kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Destination {
    /// Network byte order.
    pub daddr_v4: u32,
    pub daddr_v6: [u8; 16],
    /// Host byte order.
    pub dport: u16,
}

pub trait SocketReader {
    fn destination(&self, sock: u64, protocol: Protocol) -> Result<Destination, InsightError>;
}

pub trait OpenFile {
    /// Stable identity of the open file for as long as it stays open.
    fn identity(&self) -> u64;

    fn is_regular(&self) -> Result<bool, InsightError>;

    /// Writes the last path component, truncated and NUL-terminated.
    fn read_basename(&self, dest: &mut [u8; FILENAME_LEN]) -> Result<(), InsightError>;
}

/// Files whose full path can be resolved from the current context.
pub trait ResolvePath: OpenFile {
    fn resolve_path(&self, dest: &mut [u8; FILENAME_LEN]) -> Result<(), InsightError>;
}

/// Number of bytes to copy out of a buffer of `actual` bytes into one of `capacity`.
#[inline(always)]
pub fn capture_len(actual: usize, capacity: usize) -> usize {
    if actual < capacity {
        actual
    } else {
        capacity
    }
}

/// Scope check that only reads the parent when it has to.
#[inline(always)]
pub fn task_in_scope<T: TaskInfo>(task: &T, target: u32) -> Result<bool, InsightError> {
    if target == 0 {
        return Ok(true);
    }
    let tgid = task.tgid()?;
    if tgid == target {
        return Ok(true);
    }
    Ok(in_scope(tgid, task.parent_tgid()?, target))
}
