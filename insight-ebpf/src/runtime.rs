//! Binds the capability traits of `insight_common::pipeline` to maps and helpers.

use core::marker::PhantomData;
use core::mem::{size_of, ManuallyDrop};
use core::ops::{Deref, DerefMut};
use core::ptr::{addr_of, addr_of_mut};
use core::sync::atomic::{AtomicU32, Ordering};

use aya_ebpf::bindings::{pt_regs, BPF_NOEXIST};
use aya_ebpf::cty::{c_char, uintptr_t};
use aya_ebpf::helpers::generated::{bpf_get_current_task, bpf_override_return};
use aya_ebpf::helpers::{
    bpf_d_path, bpf_get_current_comm, bpf_get_current_pid_tgid, bpf_get_current_uid_gid,
    bpf_ktime_get_ns, bpf_probe_read_kernel, bpf_probe_read_kernel_str_bytes,
    bpf_probe_read_user_buf, bpf_probe_read_user_str_bytes,
};
use aya_ebpf::maps::ring_buf::RingBufEntry;
use aya_ebpf::maps::{HashMap, LruHashMap, PerCpuArray, PerfEventArray, RingBuf};
use aya_ebpf::programs::TracePointContext;
use aya_ebpf::EbpfContext;

use insight_common::event::{CpuHistogram, PathEntry, Protocol};
use insight_common::pipeline::{
    CorrelationTable, CurrentTask, Destination, EventSink, EventSlot, HistogramTable, OpenFile,
    PathCache, ResolvePath, ReturnOverride, SocketReader, TaskInfo, UserMemory, Zeroable,
};
use insight_common::InsightError::{
    CouldntAccessBuffer, CouldntGetPath, CouldntReadKernel, CouldntReadUser, MissingArg,
    OutOfSpace,
};
use insight_common::{InsightError, FILENAME_LEN, MAX_SLOTS, TASK_COMM_LEN};

use crate::binding::{file, sock, task_struct};

const S_IFMT: u16 = 0o170000;
const S_IFREG: u16 = 0o100000;

#[inline(always)]
unsafe fn read_kernel<T>(name: &'static str, ptr: *const T) -> Result<T, InsightError> {
    bpf_probe_read_kernel(ptr)
        .map_err(|_| CouldntReadKernel(name, ptr as uintptr_t as u64, size_of::<T>()))
}

/// Syscall tracepoints carry the syscall number after the common header, followed by the
/// arguments as longs.
const SYSCALL_ARGS_OFFSET: usize = 16;

#[inline(always)]
pub unsafe fn syscall_arg(
    ctx: &TracePointContext,
    name: &'static str,
    index: usize,
) -> Result<u64, InsightError> {
    ctx.read_at::<u64>(SYSCALL_ARGS_OFFSET + 8 * index)
        .map_err(|_| MissingArg(name, index))
}

/// The return value recorded by a `sys_exit_*` tracepoint.
#[inline(always)]
pub unsafe fn syscall_ret(ctx: &TracePointContext, name: &'static str) -> Result<i64, InsightError> {
    ctx.read_at::<i64>(SYSCALL_ARGS_OFFSET)
        .map_err(|_| MissingArg(name, 0))
}

/// A correlation table backed by an LRU hash map: a full table evicts its least
/// recently used entry instead of refusing the insert. The name shows up in errors.
pub struct Table<M: 'static>(pub &'static M, pub &'static str);

impl<K: 'static, V: Copy + 'static> CorrelationTable<K, V> for Table<LruHashMap<K, V>> {
    #[inline(always)]
    fn record(&self, key: &K, value: &V) -> Result<(), InsightError> {
        self.0.insert(key, value, 0).map_err(|_| OutOfSpace(self.1))
    }

    #[inline(always)]
    fn lookup(&self, key: &K) -> Option<V> {
        unsafe { self.0.get(key).copied() }
    }

    #[inline(always)]
    fn remove(&self, key: &K) {
        let _ = self.0.remove(key); // maybe evicted or removed by a racing exit
    }
}

/// Fixed-slot output: the record is staged in a zero-filled per-CPU scratch entry and
/// copied into the perf buffer on commit.
pub struct PerfSink<'a, C, T: 'static> {
    ctx: &'a C,
    scratch: &'static PerCpuArray<T>,
    queue: &'static PerfEventArray<T>,
}

impl<'a, C, T: 'static> PerfSink<'a, C, T> {
    pub fn new(
        ctx: &'a C,
        scratch: &'static PerCpuArray<T>,
        queue: &'static PerfEventArray<T>,
    ) -> Self {
        Self {
            ctx,
            scratch,
            queue,
        }
    }
}

pub struct PerfSlot<'a, C, T: 'static> {
    ctx: &'a C,
    record: &'static mut T,
    queue: &'static PerfEventArray<T>,
}

impl<C: EbpfContext, T: 'static> EventSink<T> for PerfSink<'_, C, T> {
    type Slot<'s> = PerfSlot<'s, C, T>
    where
        Self: 's;

    #[inline(always)]
    fn reserve(&self) -> Option<PerfSlot<'_, C, T>> {
        let record = self.scratch.get_ptr_mut(0)?;
        // the entry still holds the previous record of this CPU
        unsafe { core::ptr::write_bytes(record, 0, 1) };
        Some(PerfSlot {
            ctx: self.ctx,
            record: unsafe { &mut *record },
            queue: self.queue,
        })
    }
}

impl<C, T: 'static> Deref for PerfSlot<'_, C, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.record
    }
}

impl<C, T: 'static> DerefMut for PerfSlot<'_, C, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.record
    }
}

impl<C: EbpfContext, T: 'static> EventSlot<T> for PerfSlot<'_, C, T> {
    #[inline(always)]
    fn commit(self) {
        self.queue.output(self.ctx, self.record, 0);
    }

    #[inline(always)]
    fn discard(self) {}
}

/// Reserve/commit output into a ring buffer. Reserved records are zero-filled.
pub struct RingSink<T: 'static> {
    ring: &'static RingBuf,
    _record: PhantomData<T>,
}

impl<T: 'static> RingSink<T> {
    pub const fn new(ring: &'static RingBuf) -> Self {
        Self {
            ring,
            _record: PhantomData,
        }
    }
}

/// A reservation that was neither submitted nor discarded is discarded on drop, so every
/// path out of a program releases it.
pub struct RingSlot<T: 'static> {
    entry: RingBufEntry<T>,
}

impl<T: Zeroable + 'static> EventSink<T> for RingSink<T> {
    type Slot<'s> = RingSlot<T>
    where
        Self: 's;

    #[inline(always)]
    fn reserve(&self) -> Option<RingSlot<T>> {
        let mut entry = self.ring.reserve::<T>(0)?;
        unsafe { core::ptr::write_bytes(entry.as_mut_ptr(), 0, 1) };
        Some(RingSlot { entry })
    }
}

impl<T: 'static> Deref for RingSlot<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { self.entry.assume_init_ref() }
    }
}

impl<T: 'static> DerefMut for RingSlot<T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { self.entry.assume_init_mut() }
    }
}

impl<T: 'static> RingSlot<T> {
    #[inline(always)]
    fn into_entry(self) -> RingBufEntry<T> {
        let slot = ManuallyDrop::new(self);
        unsafe { core::ptr::read(&slot.entry) }
    }
}

impl<T: 'static> EventSlot<T> for RingSlot<T> {
    #[inline(always)]
    fn commit(self) {
        self.into_entry().submit(0);
    }

    #[inline(always)]
    fn discard(self) {
        self.into_entry().discard(0);
    }
}

impl<T: 'static> Drop for RingSlot<T> {
    fn drop(&mut self) {
        unsafe { core::ptr::read(&self.entry) }.discard(0);
    }
}

pub struct Paths(pub &'static LruHashMap<u64, PathEntry>);

impl PathCache for Paths {
    #[inline(always)]
    fn insert(&self, file: u64, entry: &PathEntry) -> Result<(), InsightError> {
        self.0
            .insert(&file, entry, 0)
            .map_err(|_| OutOfSpace("path cache"))
    }

    #[inline(always)]
    fn copy_into(&self, file: u64, dest: &mut [u8; FILENAME_LEN]) -> bool {
        match unsafe { self.0.get(&file) } {
            Some(entry) => {
                *dest = entry.filename;
                true
            }
            None => false,
        }
    }
}

pub struct Histograms(pub &'static HashMap<u32, CpuHistogram>);

impl HistogramTable for Histograms {
    #[inline(always)]
    fn increment<F>(&self, tgid: u32, slot: usize, comm: F) -> Result<(), InsightError>
    where
        F: FnOnce() -> Result<[u8; TASK_COMM_LEN], InsightError>,
    {
        let entry = match self.0.get_ptr_mut(&tgid) {
            Some(entry) => entry,
            None => {
                let fresh = CpuHistogram::new(comm()?);
                // a racing creator wins; its entry is the one incremented below
                let _ = self.0.insert(&tgid, &fresh, BPF_NOEXIST as u64);
                self.0
                    .get_ptr_mut(&tgid)
                    .ok_or(OutOfSpace("cpu histograms"))?
            }
        };
        let slot = if slot < MAX_SLOTS { slot } else { MAX_SLOTS - 1 };
        let counter = unsafe { AtomicU32::from_ptr(addr_of_mut!((*entry).histogram[slot])) };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// The task the program runs on behalf of.
pub struct Current;

impl TaskInfo for Current {
    #[inline(always)]
    fn tgid(&self) -> Result<u32, InsightError> {
        Ok((bpf_get_current_pid_tgid() >> 32) as u32)
    }

    #[inline(always)]
    fn pid(&self) -> Result<u32, InsightError> {
        Ok(bpf_get_current_pid_tgid() as u32)
    }

    #[inline(always)]
    fn parent_tgid(&self) -> Result<u32, InsightError> {
        Task::current().parent_tgid()
    }

    #[inline(always)]
    fn comm(&self) -> Result<[u8; TASK_COMM_LEN], InsightError> {
        bpf_get_current_comm().map_err(|_| CouldntAccessBuffer("current comm"))
    }
}

impl CurrentTask for Current {
    #[inline(always)]
    fn uid(&self) -> u32 {
        bpf_get_current_uid_gid() as u32
    }

    #[inline(always)]
    fn ktime_ns(&self) -> u64 {
        unsafe { bpf_ktime_get_ns() }
    }
}

/// Any task, read out of kernel memory.
pub struct Task(pub *const task_struct);

impl Task {
    #[inline(always)]
    pub fn current() -> Self {
        Self(unsafe { bpf_get_current_task() } as *const task_struct)
    }
}

impl TaskInfo for Task {
    #[inline(always)]
    fn tgid(&self) -> Result<u32, InsightError> {
        unsafe { read_kernel("tgid", addr_of!((*self.0).tgid)).map(|tgid| tgid as u32) }
    }

    #[inline(always)]
    fn pid(&self) -> Result<u32, InsightError> {
        unsafe { read_kernel("pid", addr_of!((*self.0).pid)).map(|pid| pid as u32) }
    }

    #[inline(always)]
    fn parent_tgid(&self) -> Result<u32, InsightError> {
        unsafe {
            let parent = read_kernel("real_parent", addr_of!((*self.0).real_parent))?;
            read_kernel("parent tgid", addr_of!((*parent).tgid)).map(|tgid| tgid as u32)
        }
    }

    #[inline(always)]
    fn comm(&self) -> Result<[u8; TASK_COMM_LEN], InsightError> {
        let comm = unsafe { read_kernel("comm", addr_of!((*self.0).comm))? };
        Ok(comm.map(|c| c as u8))
    }
}

pub struct UserSpace;

impl UserMemory for UserSpace {
    #[inline(always)]
    fn read_user(&self, src: u64, dest: &mut [u8]) -> Result<(), InsightError> {
        let len = dest.len();
        unsafe { bpf_probe_read_user_buf(src as *const u8, dest) }
            .map_err(|_| CouldntReadUser("read_user", src, len))
    }

    #[inline(always)]
    fn read_user_str(&self, src: u64, dest: &mut [u8]) -> Result<usize, InsightError> {
        let len = dest.len();
        unsafe { bpf_probe_read_user_str_bytes(src as *const u8, dest) }
            .map(|read| read.len() + 1)
            .map_err(|_| CouldntReadUser("read_user_str", src, len))
    }
}

/// Registers of a kprobe, for overriding the probed function's return value.
pub struct Regs(pub *mut pt_regs);

impl ReturnOverride for Regs {
    #[inline(always)]
    fn override_return(&self, rc: u64) {
        unsafe { bpf_override_return(self.0, rc) };
    }
}

pub struct KernelSockets;

impl SocketReader for KernelSockets {
    #[inline(always)]
    fn destination(&self, sock: u64, protocol: Protocol) -> Result<Destination, InsightError> {
        let sk = sock as *const sock;
        let common = unsafe { addr_of!((*sk).__sk_common) };
        let dport = unsafe {
            read_kernel(
                "skc_dport",
                addr_of!((*common).__bindgen_anon_3.__bindgen_anon_1.skc_dport),
            )?
        };

        let mut destination = Destination {
            dport: u16::from_be(dport),
            ..Destination::default()
        };
        match protocol {
            Protocol::Ipv4 => {
                destination.daddr_v4 = unsafe {
                    read_kernel(
                        "skc_daddr",
                        addr_of!((*common).__bindgen_anon_1.__bindgen_anon_1.skc_daddr),
                    )?
                };
            }
            Protocol::Ipv6 => {
                destination.daddr_v6 = unsafe {
                    read_kernel(
                        "skc_v6_daddr",
                        addr_of!((*common).skc_v6_daddr.in6_u.u6_addr8),
                    )?
                };
            }
        }
        Ok(destination)
    }
}

/// An open file as passed to the file hooks.
pub struct File(pub *const file);

impl OpenFile for File {
    #[inline(always)]
    fn identity(&self) -> u64 {
        self.0 as u64
    }

    #[inline(always)]
    fn is_regular(&self) -> Result<bool, InsightError> {
        unsafe {
            let inode = read_kernel("f_inode", addr_of!((*self.0).f_inode))?;
            let mode = read_kernel("i_mode", addr_of!((*inode).i_mode))?;
            Ok(mode & S_IFMT == S_IFREG)
        }
    }

    #[inline(always)]
    fn read_basename(&self, dest: &mut [u8; FILENAME_LEN]) -> Result<(), InsightError> {
        unsafe {
            let dentry = read_kernel("f_path.dentry", addr_of!((*self.0).f_path.dentry))?;
            let name = read_kernel("d_name", addr_of!((*dentry).d_name.name))?;
            bpf_probe_read_kernel_str_bytes(name as *const u8, dest)
                .map_err(|_| CouldntReadKernel("d_name", name as uintptr_t as u64, FILENAME_LEN))?;
        }
        Ok(())
    }
}

impl ResolvePath for File {
    #[inline(always)]
    fn resolve_path(&self, dest: &mut [u8; FILENAME_LEN]) -> Result<(), InsightError> {
        let res = unsafe {
            bpf_d_path(
                addr_of!((*self.0).f_path) as *mut aya_ebpf::bindings::path,
                dest.as_mut_ptr() as *mut c_char,
                dest.len() as u32,
            )
        };
        if res < 0 {
            return Err(CouldntGetPath("d_path", res));
        }
        Ok(())
    }
}
