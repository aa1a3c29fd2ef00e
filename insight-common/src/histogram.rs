use crate::MAX_SLOTS;

/// Histogram slot of a duration: `floor(log2(value))`, clamped to the last slot.
/// Zero lands in the first slot alongside one.
#[inline(always)]
pub fn log2_slot(value: u64) -> usize {
    // ilog2 pulls in a panic path the bpf linker rejects
    let mut slot = 0;
    let mut remaining = value;
    while remaining > 1 && slot < MAX_SLOTS - 1 {
        remaining >>= 1;
        slot += 1;
    }
    slot
}
