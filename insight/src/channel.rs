//! The two output channels and the sinks the tracers emit through.
//!
//! [`PerfChannel`] is a fixed-slot, per-CPU broadcast: a record is staged in the
//! worker's scratch record and copied into that CPU's queue on commit. A full queue
//! loses the record and counts the loss.
//!
//! [`RingChannel`] accounts for its capacity in bytes. Space is reserved before a
//! record is populated and stays reserved until the record is either discarded or
//! consumed, so a slow consumer is visible to producers as failed reservations.

use std::mem::size_of;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::MutexGuard;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use insight_common::pipeline::{EventSink, EventSlot, Zeroable};
use log::trace;

use crate::scratch::ScratchPool;

pub struct PerfChannel<T> {
    queues: Vec<(Sender<T>, Receiver<T>)>,
    lost: AtomicU64,
}

impl<T: Copy> PerfChannel<T> {
    pub fn new(cpus: usize, per_cpu_capacity: usize) -> Self {
        Self {
            queues: (0..cpus.max(1)).map(|_| bounded(per_cpu_capacity)).collect(),
            lost: AtomicU64::new(0),
        }
    }

    pub fn cpus(&self) -> usize {
        self.queues.len()
    }

    pub fn output(&self, cpu: usize, record: &T) {
        let Some((tx, _)) = self.queues.get(cpu % self.queues.len()) else {
            return;
        };
        if tx.try_send(*record).is_err() {
            self.lost.fetch_add(1, Ordering::Relaxed);
            trace!("perf queue of cpu {cpu} is full, record lost");
        }
    }

    /// A consumer handle for one CPU's queue.
    pub fn receiver(&self, cpu: usize) -> Option<Receiver<T>> {
        self.queues.get(cpu).map(|(_, rx)| rx.clone())
    }

    /// Everything currently queued, CPU by CPU.
    pub fn drain(&self) -> Vec<T> {
        self.queues
            .iter()
            .flat_map(|(_, rx)| rx.try_iter())
            .collect()
    }

    pub fn lost(&self) -> u64 {
        self.lost.load(Ordering::Relaxed)
    }
}

/// Emits into a [`PerfChannel`] through the scratch record of one worker.
pub struct PerfSink<'a, T> {
    cpu: usize,
    scratch: &'a ScratchPool<T>,
    channel: &'a PerfChannel<T>,
}

impl<'a, T> PerfSink<'a, T> {
    pub fn new(cpu: usize, scratch: &'a ScratchPool<T>, channel: &'a PerfChannel<T>) -> Self {
        Self {
            cpu,
            scratch,
            channel,
        }
    }
}

pub struct PerfSlot<'s, T> {
    cpu: usize,
    record: MutexGuard<'s, Box<T>>,
    channel: &'s PerfChannel<T>,
}

impl<T: Zeroable + Copy> EventSink<T> for PerfSink<'_, T> {
    type Slot<'s> = PerfSlot<'s, T>
    where
        Self: 's;

    fn reserve(&self) -> Option<PerfSlot<'_, T>> {
        let mut record = self.scratch.acquire(self.cpu)?;
        **record = T::zeroed();
        Some(PerfSlot {
            cpu: self.cpu,
            record,
            channel: self.channel,
        })
    }
}

impl<T> Deref for PerfSlot<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.record
    }
}

impl<T> DerefMut for PerfSlot<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.record
    }
}

impl<T: Copy> EventSlot<T> for PerfSlot<'_, T> {
    fn commit(self) {
        self.channel.output(self.cpu, &self.record);
    }

    fn discard(self) {}
}

pub struct RingChannel<T> {
    capacity: usize,
    used: AtomicUsize,
    tx: Sender<Box<T>>,
    rx: Receiver<Box<T>>,
}

impl<T: Zeroable> RingChannel<T> {
    pub fn with_byte_size(capacity: usize) -> Self {
        let (tx, rx) = unbounded();
        Self {
            capacity,
            used: AtomicUsize::new(0),
            tx,
            rx,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes held by reservations and by committed records not yet consumed.
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    fn claim(&self) -> bool {
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(size_of::<T>())
                    .filter(|&total| total <= self.capacity)
            })
            .is_ok()
    }

    fn release(&self) {
        self.used.fetch_sub(size_of::<T>(), Ordering::AcqRel);
    }

    /// Reserves space for one zero-filled record.
    pub fn reserve(&self) -> Option<RingSlot<'_, T>> {
        if !self.claim() {
            trace!("ring of {} bytes is full", self.capacity);
            return None;
        }
        Some(RingSlot {
            ring: self,
            record: Some(Box::new(T::zeroed())),
        })
    }

    pub fn try_recv(&self) -> Option<T> {
        let record = self.rx.try_recv().ok()?;
        self.release();
        Some(*record)
    }

    pub fn drain(&self) -> Vec<T> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

/// Emits into a [`RingChannel`].
pub struct RingSink<'a, T>(pub &'a RingChannel<T>);

pub struct RingSlot<'s, T: Zeroable> {
    ring: &'s RingChannel<T>,
    record: Option<Box<T>>,
}

impl<T: Zeroable> EventSink<T> for RingSink<'_, T> {
    type Slot<'s> = RingSlot<'s, T>
    where
        Self: 's;

    fn reserve(&self) -> Option<RingSlot<'_, T>> {
        self.0.reserve()
    }
}

impl<T: Zeroable> Deref for RingSlot<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.record.as_deref() {
            Some(record) => record,
            None => unreachable!("ring slot used after submission"),
        }
    }
}

impl<T: Zeroable> DerefMut for RingSlot<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match self.record.as_deref_mut() {
            Some(record) => record,
            None => unreachable!("ring slot used after submission"),
        }
    }
}

impl<T: Zeroable> EventSlot<T> for RingSlot<'_, T> {
    fn commit(mut self) {
        if let Some(record) = self.record.take() {
            if self.ring.tx.send(record).is_err() {
                self.ring.release();
            }
        }
    }

    fn discard(self) {}
}

impl<T: Zeroable> Drop for RingSlot<'_, T> {
    fn drop(&mut self) {
        if self.record.take().is_some() {
            self.ring.release();
        }
    }
}

#[cfg(test)]
mod test {
    use insight_common::event::{HttpEvent, PollEvent, VfsEvent};
    use insight_common::pipeline::{EventSink, EventSlot};

    use super::*;

    #[test]
    fn perf_queue_full_loses_silently() {
        let channel = PerfChannel::<PollEvent>::new(1, 1);
        let scratch = ScratchPool::new(1);
        let sink = PerfSink::new(0, &scratch, &channel);

        for fd in 0..3 {
            let mut slot = sink.reserve().unwrap();
            slot.fd = fd;
            slot.commit();
        }
        assert_eq!(channel.lost(), 2);
        let events = channel.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].fd, 0);
    }

    #[test]
    fn perf_slot_is_exclusive_per_cpu() {
        let channel = PerfChannel::<PollEvent>::new(2, 4);
        let scratch = ScratchPool::new(2);
        let cpu0 = PerfSink::new(0, &scratch, &channel);
        let cpu1 = PerfSink::new(1, &scratch, &channel);

        let held = cpu0.reserve().unwrap();
        assert!(cpu0.reserve().is_none());
        assert!(cpu1.reserve().is_some());
        held.discard();
        assert!(cpu0.reserve().is_some());
        assert!(channel.drain().is_empty());
    }

    #[test]
    fn perf_slot_does_not_carry_the_previous_record() {
        let channel = PerfChannel::<HttpEvent>::new(1, 4);
        let scratch = ScratchPool::new(1);
        let sink = PerfSink::new(0, &scratch, &channel);

        let mut slot = sink.reserve().unwrap();
        slot.buf[..6].copy_from_slice(b"secret");
        slot.len = 6;
        slot.commit();

        let slot = sink.reserve().unwrap();
        assert_eq!(slot.len, 0);
        assert!(slot.buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn ring_reservations_are_accounted_until_consumed() {
        let ring = RingChannel::<VfsEvent>::with_byte_size(2 * size_of::<VfsEvent>());
        let first = ring.reserve().unwrap();
        let second = ring.reserve().unwrap();
        assert!(ring.reserve().is_none());

        first.discard();
        assert_eq!(ring.used(), size_of::<VfsEvent>());

        second.commit();
        assert_eq!(ring.used(), size_of::<VfsEvent>());
        let third = ring.reserve().unwrap();
        drop(third);

        assert_eq!(ring.drain().len(), 1);
        assert_eq!(ring.used(), 0);
    }

    #[test]
    fn ring_records_start_zeroed() {
        let ring = RingChannel::<VfsEvent>::with_byte_size(1 << 16);
        let mut slot = ring.reserve().unwrap();
        assert_eq!(slot.ret, 0);
        assert!(slot.filename.iter().all(|&b| b == 0));
        slot.ret = -5;
        slot.commit();
        assert_eq!(ring.try_recv().unwrap().ret, -5);
    }
}
