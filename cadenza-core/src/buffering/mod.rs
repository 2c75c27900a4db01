//! Fixed-capacity SPSC frame ring between the synth producer and the audio
//! output callback.
//!
//! # Design constraints
//!
//! The cpal output callback runs on an OS audio thread at elevated priority.
//! It **must not**:
//! - Allocate heap memory
//! - Block on a mutex or condvar
//! - Perform I/O
//!
//! `FramePool` satisfies that contract: both sides only touch atomic cursors
//! and `try_lock` a pre-allocated slot. A slot that cannot be locked is
//! reported as not-ready (`None`), never waited on.
//!
//! # Cursor scheme
//!
//! The cursors are monotonic `u64` counters; a slot index is `cursor % slots`
//! and the fill level is `write - read`. The pool holds at most `slots - 1`
//! frames, so a full pool and an empty pool are always distinguishable and
//! the producer can never lap the consumer. Cursor updates are atomic because
//! the callback genuinely runs in parallel with the producer thread.
//!
//! Correctness of the slot locks relies on the single-producer/single-reader
//! contract: exactly one task calls [`FramePool::prepare`] and exactly one
//! callback calls [`FramePool::take`]. Under that contract the locks are
//! never contended except for the one instant where a guard publishes its
//! cursor just before unlocking; the opposite side treats that instant as an
//! ordinary underrun/overrun and recovers on its next cycle.

pub mod frame;

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::error::{CadenzaError, Result};

pub use frame::FrameBuffer;

/// Default number of slots in the ring. Capacity is one less: 23 frames of
/// lead time (about 2.1 s at 4096 samples / 44.1 kHz).
pub const DEFAULT_POOL_SLOTS: usize = 24;

struct PoolInner {
    slots: Box<[Mutex<FrameBuffer>]>,
    /// Next cursor the producer will commit. Slot index is `write % slots`.
    write: AtomicU64,
    /// Next cursor the consumer will drain. Slot index is `read % slots`.
    read: AtomicU64,
}

impl PoolInner {
    fn filled(&self) -> usize {
        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Acquire);
        // `read` can transiently pass the earlier `write` load during reset.
        write.saturating_sub(read) as usize
    }
}

/// The frame ring. Cheap to clone; clones share the same slots and cursors.
///
/// The engine hands one clone to the producer loop and one to the output
/// callback, which is how the single-writer/single-reader discipline is
/// enforced by construction.
#[derive(Clone)]
pub struct FramePool {
    inner: Arc<PoolInner>,
}

impl FramePool {
    /// Allocate a pool of `slots` frames, each `channels` x `frame_length`.
    ///
    /// # Errors
    /// Returns `CadenzaError::InvalidConfig` when `slots < 2` (a one-slot
    /// ring can hold nothing) or when `channels` / `frame_length` is zero.
    pub fn new(slots: usize, channels: usize, frame_length: usize) -> Result<Self> {
        if slots < 2 {
            return Err(CadenzaError::InvalidConfig(format!(
                "pool needs at least 2 slots, got {slots}"
            )));
        }
        if channels == 0 || frame_length == 0 {
            return Err(CadenzaError::InvalidConfig(format!(
                "frame shape must be non-empty, got {channels} channels x {frame_length} samples"
            )));
        }

        let slots = (0..slots)
            .map(|_| Mutex::new(FrameBuffer::new(channels, frame_length)))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            inner: Arc::new(PoolInner {
                slots,
                write: AtomicU64::new(0),
                read: AtomicU64::new(0),
            }),
        })
    }

    /// Total number of slots (capacity is `slots() - 1`).
    pub fn slots(&self) -> usize {
        self.inner.slots.len()
    }

    /// Number of committed frames waiting to be drained. Always in
    /// `[0, slots - 1]`.
    pub fn filled(&self) -> usize {
        self.inner.filled()
    }

    /// `true` when no further frame can be committed.
    pub fn is_full(&self) -> bool {
        self.filled() >= self.slots() - 1
    }

    /// `true` when there is nothing to drain.
    pub fn is_empty(&self) -> bool {
        self.filled() == 0
    }

    /// Logically empty the pool by advancing the read cursor up to the write
    /// cursor. Slot contents are left stale; the producer overwrites them
    /// before they can be observed again.
    ///
    /// Safe to call while the consumer is live: an in-flight [`take`] races
    /// the cursor with a compare-exchange and simply loses, at worst playing
    /// one already-copied stale frame.
    ///
    /// [`take`]: FramePool::take
    pub fn reset(&self) {
        let write = self.inner.write.load(Ordering::Acquire);
        self.inner.read.store(write, Ordering::Release);
    }

    /// Reserve the slot at the write cursor for filling.
    ///
    /// Returns `None` when the pool is full (the overrun condition) without
    /// mutating anything. Otherwise the returned guard gives mutable access
    /// to the slot's [`FrameBuffer`]; dropping the guard commits the frame
    /// (advances the write cursor), [`WriteSlot::discard`] abandons it.
    pub fn prepare(&self) -> Option<WriteSlot<'_>> {
        let write = self.inner.write.load(Ordering::Acquire);
        let read = self.inner.read.load(Ordering::Acquire);
        if write.saturating_sub(read) as usize >= self.slots() - 1 {
            return None;
        }

        let index = (write % self.inner.slots.len() as u64) as usize;
        // Contended only while the consumer is still copying out a slot the
        // producer has wrapped back onto; report not-ready rather than wait.
        let guard = self.inner.slots[index].try_lock()?;

        Some(WriteSlot {
            inner: &self.inner,
            guard,
            cursor: write,
            commit: true,
        })
    }

    /// Drain the frame at the read cursor.
    ///
    /// Returns `None` when the pool is empty (the underrun condition) without
    /// mutating anything. Otherwise the read cursor advances and the returned
    /// guard gives read access to the frame while it is copied out. Frames
    /// come out in exactly the order they were committed.
    pub fn take(&self) -> Option<ReadSlot<'_>> {
        let read = self.inner.read.load(Ordering::Acquire);
        let write = self.inner.write.load(Ordering::Acquire);
        if write <= read {
            return None;
        }

        let index = (read % self.inner.slots.len() as u64) as usize;
        let guard = self.inner.slots[index].try_lock()?;

        // A concurrent reset() may have moved the cursor past us; the slot is
        // stale in that case and is skipped.
        if self
            .inner
            .read
            .compare_exchange(read, read + 1, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return None;
        }

        Some(ReadSlot { guard })
    }
}

impl std::fmt::Debug for FramePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePool")
            .field("slots", &self.slots())
            .field("filled", &self.filled())
            .finish()
    }
}

/// Write reservation returned by [`FramePool::prepare`].
///
/// Derefs to the slot's [`FrameBuffer`]. Dropping the guard commits the
/// frame; [`WriteSlot::discard`] releases the slot without committing, which
/// is the failed-render path: nothing is published and the same slot is
/// reserved again on the next cycle.
pub struct WriteSlot<'a> {
    inner: &'a PoolInner,
    guard: MutexGuard<'a, FrameBuffer>,
    cursor: u64,
    commit: bool,
}

impl WriteSlot<'_> {
    /// Release the slot without committing it.
    pub fn discard(mut self) {
        self.commit = false;
    }
}

impl Deref for WriteSlot<'_> {
    type Target = FrameBuffer;

    fn deref(&self) -> &FrameBuffer {
        &self.guard
    }
}

impl DerefMut for WriteSlot<'_> {
    fn deref_mut(&mut self) -> &mut FrameBuffer {
        &mut self.guard
    }
}

impl Drop for WriteSlot<'_> {
    fn drop(&mut self) {
        if self.commit {
            // The cursor publishes a moment before the slot mutex unlocks
            // (fields drop after this body); the consumer's try_lock treats
            // that instant as not-ready.
            let _ = self.inner.write.compare_exchange(
                self.cursor,
                self.cursor + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            );
        }
    }
}

/// Drained frame returned by [`FramePool::take`].
///
/// Derefs to the committed [`FrameBuffer`]. The read cursor has already
/// advanced; the guard only keeps the producer out of the slot while the
/// contents are copied to the device buffer.
pub struct ReadSlot<'a> {
    guard: MutexGuard<'a, FrameBuffer>,
}

impl Deref for ReadSlot<'_> {
    type Target = FrameBuffer;

    fn deref(&self) -> &FrameBuffer {
        &self.guard
    }
}
