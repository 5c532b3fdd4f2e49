//! Fixed-capacity pools of fixed-size staging buffers.
//!
//! A [`Slab`] carves one contiguous allocation into equally sized slots. A
//! slot is handed out as a move-only [`Slot`]; [`Slab::release`] consumes it,
//! so a released slot cannot be used or released again. Each slot carries a
//! write cursor so partially received frames and header blocks can be staged
//! across several network reads.
//!
//! [`SlotBuffer`] wraps the acquire/append/release cycle for one owner and
//! returns its slot on drop. [`ConnectionBuffers`] pairs a frame buffer and a
//! header-block buffer drawn from two independent slabs.

use std::{
    cell::{Ref, RefCell},
    rc::Rc,
    sync::atomic::{AtomicU32, Ordering},
};

use log::{debug, error};
use thiserror::Error;

use crate::metrics;

static NEXT_POOL_ID: AtomicU32 = AtomicU32::new(1);

/// Errors raised by slab operations.
#[non_exhaustive]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SlabError {
    /// Every slot is in use.
    #[error("slab exhausted: all {slots} slots in use")]
    Exhausted {
        /// Number of slots in the slab.
        slots: usize,
    },
    /// An append would run past the end of the slot.
    #[error("slot overflow: {attempted} bytes at offset {offset} exceed capacity {capacity}")]
    SlotOverflow {
        /// Current write cursor.
        offset: usize,
        /// Bytes the caller tried to append.
        attempted: usize,
        /// Slot capacity in bytes.
        capacity: usize,
    },
    /// The requested dimensions cannot form a slab.
    #[error(
        "invalid slab dimensions: total {total} with slots of {slot} bytes; slot size must be a \
         non-zero power of two dividing the total"
    )]
    InvalidCapacity {
        /// Requested total capacity.
        total: usize,
        /// Requested slot capacity.
        slot: usize,
    },
}

/// Identifier distinguishing one slab from another.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PoolId(u32);

/// Exclusive claim on one slab slot.
///
/// `Slot` is deliberately neither `Clone` nor `Copy`.
#[derive(Debug, PartialEq, Eq)]
pub struct Slot {
    index: usize,
    pool: PoolId,
}

impl Slot {
    /// Position of the slot within its slab.
    #[must_use]
    pub const fn index(&self) -> usize { self.index }

    /// Slab the slot was acquired from.
    #[must_use]
    pub const fn pool(&self) -> PoolId { self.pool }
}

/// Fixed pool of equally sized byte slots.
#[derive(Debug)]
pub struct Slab {
    id: PoolId,
    slot_capacity: usize,
    memory: Vec<u8>,
    offsets: Vec<usize>,
    free: Vec<usize>,
}

impl Slab {
    /// Create a slab of `total_capacity` bytes split into slots of
    /// `slot_capacity` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SlabError::InvalidCapacity`] unless `slot_capacity` is a
    /// non-zero power of two that divides a non-zero `total_capacity`.
    pub fn new(total_capacity: usize, slot_capacity: usize) -> Result<Self, SlabError> {
        let valid = slot_capacity.is_power_of_two()
            && total_capacity >= slot_capacity
            && total_capacity % slot_capacity == 0;
        if !valid {
            return Err(SlabError::InvalidCapacity {
                total: total_capacity,
                slot: slot_capacity,
            });
        }

        let slots = total_capacity / slot_capacity;
        Ok(Self {
            id: PoolId(NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed)),
            slot_capacity,
            memory: vec![0; total_capacity],
            offsets: vec![0; slots],
            free: (0..slots).rev().collect(),
        })
    }

    /// Identifier of this slab.
    #[must_use]
    pub const fn id(&self) -> PoolId { self.id }

    /// Capacity of each slot in bytes.
    #[must_use]
    pub const fn slot_capacity(&self) -> usize { self.slot_capacity }

    /// Number of slots in the slab.
    #[must_use]
    pub fn slot_count(&self) -> usize { self.offsets.len() }

    /// Number of slots currently handed out.
    #[must_use]
    pub fn acquired(&self) -> usize { self.offsets.len() - self.free.len() }

    /// Number of slots available for acquisition.
    #[must_use]
    pub fn available(&self) -> usize { self.free.len() }

    /// Claim a free slot with its write cursor at zero.
    ///
    /// # Errors
    ///
    /// Returns [`SlabError::Exhausted`] when every slot is in use.
    pub fn acquire(&mut self) -> Result<Slot, SlabError> {
        let Some(index) = self.free.pop() else {
            metrics::inc_slab_exhausted();
            return Err(SlabError::Exhausted {
                slots: self.slot_count(),
            });
        };
        self.offsets[index] = 0;
        Ok(Slot {
            index,
            pool: self.id,
        })
    }

    /// Return a slot to the pool.
    pub fn release(&mut self, slot: Slot) {
        debug_assert_eq!(slot.pool, self.id, "slot released to a foreign slab");
        debug_assert!(
            !self.free.contains(&slot.index),
            "slot {} released while already free",
            slot.index
        );
        self.offsets[slot.index] = 0;
        self.free.push(slot.index);
    }

    /// Write cursor of `slot`.
    #[must_use]
    pub fn offset(&self, slot: &Slot) -> usize { self.offsets[slot.index] }

    /// Append `bytes` at the write cursor of `slot`, returning the new cursor.
    ///
    /// # Errors
    ///
    /// Returns [`SlabError::SlotOverflow`] without writing anything when the
    /// bytes do not fit.
    pub fn append(&mut self, slot: &Slot, bytes: &[u8]) -> Result<usize, SlabError> {
        debug_assert_eq!(slot.pool, self.id, "slot used with a foreign slab");
        let offset = self.offsets[slot.index];
        let end = offset
            .checked_add(bytes.len())
            .filter(|end| *end <= self.slot_capacity)
            .ok_or(SlabError::SlotOverflow {
                offset,
                attempted: bytes.len(),
                capacity: self.slot_capacity,
            })?;
        let base = self.base(slot);
        self.memory[base + offset..base + end].copy_from_slice(bytes);
        self.offsets[slot.index] = end;
        Ok(end)
    }

    /// Bytes written to `slot` so far.
    #[must_use]
    pub fn contents(&self, slot: &Slot) -> &[u8] {
        let base = self.base(slot);
        &self.memory[base..base + self.offsets[slot.index]]
    }

    /// Discard the first `count` staged bytes of `slot`, shifting the rest
    /// to the start. Returns the number of bytes left.
    pub fn consume(&mut self, slot: &Slot, count: usize) -> usize {
        let base = self.base(slot);
        let offset = self.offsets[slot.index];
        let count = count.min(offset);
        self.memory
            .copy_within(base + count..base + offset, base);
        let remaining = offset - count;
        self.offsets[slot.index] = remaining;
        remaining
    }

    fn base(&self, slot: &Slot) -> usize { slot.index * self.slot_capacity }
}

/// Slab shared between the streams of one factory.
pub type SharedSlab = Rc<RefCell<Slab>>;

/// Staging area owning at most one slot of a shared slab.
///
/// A slot is acquired on the first append and handed back as soon as the
/// staged bytes are fully consumed, when [`release`](Self::release) is
/// called, or when the buffer is dropped.
#[derive(Debug)]
pub struct SlotBuffer {
    slab: SharedSlab,
    slot: Option<Slot>,
}

impl SlotBuffer {
    /// Create an empty buffer drawing from `slab`.
    #[must_use]
    pub fn new(slab: SharedSlab) -> Self { Self { slab, slot: None } }

    /// Whether a slot is currently held.
    #[must_use]
    pub fn is_held(&self) -> bool { self.slot.is_some() }

    /// Number of staged bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slot
            .as_ref()
            .map_or(0, |slot| self.slab.borrow().offset(slot))
    }

    /// Whether nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Stage `bytes`, acquiring a slot first if none is held.
    ///
    /// # Errors
    ///
    /// Returns [`SlabError::Exhausted`] when no slot can be acquired and
    /// [`SlabError::SlotOverflow`] when the bytes do not fit. A slot acquired
    /// by a failing call is released again before returning.
    pub fn append(&mut self, bytes: &[u8]) -> Result<usize, SlabError> {
        let mut slab = self.slab.borrow_mut();
        let acquired_now = self.slot.is_none();
        let slot = match self.slot.take() {
            Some(slot) => slot,
            None => slab.acquire()?,
        };
        match slab.append(&slot, bytes) {
            Ok(end) => {
                self.slot = Some(slot);
                Ok(end)
            }
            Err(err) => {
                if acquired_now {
                    slab.release(slot);
                } else {
                    self.slot = Some(slot);
                }
                Err(err)
            }
        }
    }

    /// Borrow the staged bytes.
    #[must_use]
    pub fn contents(&self) -> Ref<'_, [u8]> {
        let slab = self.slab.borrow();
        Ref::map(slab, |slab| match &self.slot {
            Some(slot) => slab.contents(slot),
            None => &[],
        })
    }

    /// Discard the first `count` staged bytes; releases the slot when nothing
    /// remains. Returns the number of bytes left.
    pub fn consume(&mut self, count: usize) -> usize {
        let Some(slot) = self.slot.take() else {
            return 0;
        };
        let mut slab = self.slab.borrow_mut();
        let remaining = slab.consume(&slot, count);
        if remaining == 0 {
            slab.release(slot);
        } else {
            self.slot = Some(slot);
        }
        remaining
    }

    /// Return the held slot, discarding any staged bytes.
    pub fn release(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.slab.borrow_mut().release(slot);
        }
    }
}

impl Drop for SlotBuffer {
    fn drop(&mut self) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        if let Ok(mut slab) = self.slab.try_borrow_mut() {
            debug!("slot {} returned on drop", slot.index());
            slab.release(slot);
        } else {
            error!("slot {} leaked: slab borrowed during drop", slot.index());
        }
    }
}

/// Per-connection staging for partial frames and header blocks.
#[derive(Debug)]
pub struct ConnectionBuffers {
    /// Partially received frame bytes.
    pub frame: SlotBuffer,
    /// Header block awaiting its continuation frames.
    pub headers: SlotBuffer,
}

impl ConnectionBuffers {
    /// Create empty buffers drawing from the two slabs.
    #[must_use]
    pub fn new(frame_slab: SharedSlab, headers_slab: SharedSlab) -> Self {
        Self {
            frame: SlotBuffer::new(frame_slab),
            headers: SlotBuffer::new(headers_slab),
        }
    }

    /// Number of slots currently held across both buffers.
    #[must_use]
    pub fn held(&self) -> usize { usize::from(self.frame.is_held()) + usize::from(self.headers.is_held()) }

    /// Release every held slot.
    pub fn release_all(&mut self) {
        self.frame.release();
        self.headers.release();
    }
}
