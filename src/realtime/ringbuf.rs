// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Lock-free single-producer single-consumer byte ring buffer.
//!
//! Used for moving raw bytes into or out of the audio callback without
//! blocking. Writes and reads are all-or-nothing: a record written as several
//! slices in one [`RingBuffer::write_vectored`] call is never observed
//! half-written by the consumer.
//!
//! # Example
//!
//! ```
//! use rtring::realtime::RingBuffer;
//!
//! let (mut producer, mut consumer) = RingBuffer::new(1024).unwrap().split();
//!
//! // Producer writes a header and a payload as one record
//! let payload = [1u8, 2, 3];
//! let header = (payload.len() as u32).to_le_bytes();
//! producer.write_vectored(&[&header, &payload]).unwrap();
//!
//! // Consumer reads them back
//! let mut record = [0u8; 7];
//! consumer.read(&mut record).unwrap();
//! assert_eq!(&record[4..], &payload);
//! ```

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use super::halves::{Consumer, Producer};
use crate::error::RingBufferError;

/// Capacities must be a positive multiple of this many bytes.
pub const CAPACITY_ALIGNMENT: usize = 256;

/// A lock-free single-producer single-consumer byte ring buffer.
///
/// Owned directly, every operation is available and the borrow checker rules
/// out concurrent use. Call [`split`](Self::split) to hand the producer and
/// consumer roles to two different threads.
pub struct RingBuffer {
    /// The byte storage, `capacity` cells long.
    storage: Box<[UnsafeCell<u8>]>,
    /// Total bytes ever written, modulo `wrap` (only advanced by the producer).
    write_pos: AtomicUsize,
    /// Total bytes ever read, modulo `wrap` (only advanced by the consumer).
    read_pos: AtomicUsize,
    /// Whether positions are published with acquire/release ordering.
    atomic: AtomicBool,
    capacity: usize,
    /// Largest multiple of `capacity` representable in `usize`.
    wrap: usize,
}

// SAFETY: The storage is only written by the producer in the free region and
// only read by the consumer in the filled region. Positions are atomics, and
// the regions are handed over through release stores / acquire loads.
unsafe impl Send for RingBuffer {}
unsafe impl Sync for RingBuffer {}

impl RingBuffer {
    /// Create a new, empty ring buffer in atomic mode.
    ///
    /// `capacity` must be a positive multiple of [`CAPACITY_ALIGNMENT`].
    /// Storage is reserved fallibly, so an allocation failure is reported as
    /// [`RingBufferError::Allocation`] instead of aborting.
    pub fn new(capacity: usize) -> Result<Self, RingBufferError> {
        if capacity == 0 || capacity % CAPACITY_ALIGNMENT != 0 {
            warn!("Rejected ring buffer capacity {}", capacity);
            return Err(RingBufferError::InvalidCapacity { capacity });
        }

        let mut storage = Vec::new();
        if let Err(source) = storage.try_reserve_exact(capacity) {
            warn!("Failed to allocate {} bytes for ring buffer", capacity);
            return Err(RingBufferError::Allocation { capacity, source });
        }
        storage.resize_with(capacity, || UnsafeCell::new(0));

        debug!("Created ring buffer with capacity {}", capacity);
        Ok(Self {
            storage: storage.into_boxed_slice(),
            write_pos: AtomicUsize::new(0),
            read_pos: AtomicUsize::new(0),
            atomic: AtomicBool::new(true),
            capacity,
            wrap: (usize::MAX / capacity) * capacity,
        })
    }

    /// Get the capacity of the buffer in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of bytes that can currently be written.
    #[inline]
    pub fn available_to_write(&self) -> usize {
        self.capacity - self.available_to_read()
    }

    /// Number of bytes that can currently be read.
    #[inline]
    pub fn available_to_read(&self) -> usize {
        let write = self.write_pos.load(self.load_ordering());
        let read = self.read_pos.load(self.load_ordering());
        self.distance(write, read)
    }

    /// Check if the buffer holds no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.available_to_read() == 0
    }

    /// Check if the buffer has no free space.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.available_to_write() == 0
    }

    /// Whether position updates use acquire/release ordering.
    #[inline]
    pub fn is_atomic(&self) -> bool {
        self.atomic.load(Ordering::Relaxed)
    }

    /// Enable or disable ordered position updates.
    ///
    /// Plain mode skips the memory ordering on every operation. Holding the
    /// buffer by `&mut` guarantees nothing else is reading or writing it.
    pub fn set_atomic(&mut self, enabled: bool) {
        debug!("Ring buffer atomic mode set to {}", enabled);
        *self.atomic.get_mut() = enabled;
    }

    /// Write all `sources` in order as one indivisible record.
    ///
    /// Fails without writing anything if the combined length does not fit.
    pub fn write_vectored(&mut self, sources: &[&[u8]]) -> Result<(), RingBufferError> {
        // SAFETY: `&mut self` makes this the only producer.
        unsafe { self.produce_vectored(sources) }
    }

    /// Write a single slice.
    pub fn write(&mut self, src: &[u8]) -> Result<(), RingBufferError> {
        self.write_vectored(&[src])
    }

    /// Write `n` copies of `value`.
    pub fn write_value(&mut self, value: u8, n: usize) -> Result<(), RingBufferError> {
        // SAFETY: `&mut self` makes this the only producer.
        unsafe { self.produce_value(value, n) }
    }

    /// Fill `dest` completely from the buffer.
    ///
    /// Fails without copying anything if fewer than `dest.len()` bytes are
    /// buffered.
    pub fn read(&mut self, dest: &mut [u8]) -> Result<(), RingBufferError> {
        // SAFETY: `&mut self` makes this the only consumer.
        unsafe { self.consume(dest, true) }
    }

    /// Like [`read`](Self::read), but leaves the bytes in the buffer.
    pub fn peek(&self, dest: &mut [u8]) -> Result<(), RingBufferError> {
        // SAFETY: shared access excludes `&mut` producers and consumers, and
        // nothing is advanced.
        unsafe { self.consume(dest, false) }
    }

    /// Discard `len` buffered bytes without copying them.
    pub fn skip(&mut self, len: usize) -> Result<(), RingBufferError> {
        // SAFETY: `&mut self` makes this the only consumer.
        unsafe { self.consume_skip(len) }
    }

    /// Discard everything and reset both positions to zero.
    pub fn clear(&mut self) {
        *self.write_pos.get_mut() = 0;
        *self.read_pos.get_mut() = 0;
        debug!("Cleared ring buffer");
    }

    /// Split into producer and consumer handles.
    ///
    /// The halves always start in atomic mode, since they are meant to run on
    /// different threads.
    pub fn split(mut self) -> (Producer, Consumer) {
        if !self.is_atomic() {
            debug!("Re-enabling atomic mode for split ring buffer");
            *self.atomic.get_mut() = true;
        }
        let shared = Arc::new(self);
        (Producer::new(Arc::clone(&shared)), Consumer::new(shared))
    }

    // ------------------------------------------------------------------------
    // Shared paths used by the owned buffer and by the split halves.
    // ------------------------------------------------------------------------

    #[inline]
    fn load_ordering(&self) -> Ordering {
        if self.is_atomic() {
            Ordering::Acquire
        } else {
            Ordering::Relaxed
        }
    }

    #[inline]
    fn store_ordering(&self) -> Ordering {
        if self.is_atomic() {
            Ordering::Release
        } else {
            Ordering::Relaxed
        }
    }

    /// Bytes between two positions, both in `[0, wrap)`.
    #[inline]
    fn distance(&self, write: usize, read: usize) -> usize {
        if write >= read {
            write - read
        } else {
            self.wrap - read + write
        }
    }

    /// Move a position forward by `n <= capacity` bytes.
    #[inline]
    fn advance(&self, pos: usize, n: usize) -> usize {
        let room = self.wrap - pos;
        if n >= room {
            n - room
        } else {
            pos + n
        }
    }

    #[inline]
    fn base(&self) -> *mut u8 {
        UnsafeCell::raw_get(self.storage.as_ptr())
    }

    /// Copy `src` into storage at physical `offset`, wrapping at the end.
    ///
    /// Returns the physical offset following the copied bytes.
    ///
    /// # Safety
    ///
    /// Caller must be the only producer and `src` must fit in the free region.
    #[inline]
    unsafe fn copy_in(&self, offset: usize, src: &[u8]) -> usize {
        let first = src.len().min(self.capacity - offset);
        let base = self.base();
        std::ptr::copy_nonoverlapping(src.as_ptr(), base.add(offset), first);
        std::ptr::copy_nonoverlapping(src.as_ptr().add(first), base, src.len() - first);
        (offset + src.len()) % self.capacity
    }

    /// Fill `n` bytes at physical `offset` with `value`, wrapping at the end.
    ///
    /// # Safety
    ///
    /// Same contract as [`copy_in`](Self::copy_in).
    #[inline]
    unsafe fn fill(&self, offset: usize, value: u8, n: usize) {
        let first = n.min(self.capacity - offset);
        let base = self.base();
        std::ptr::write_bytes(base.add(offset), value, first);
        std::ptr::write_bytes(base, value, n - first);
    }

    /// Copy `dest.len()` bytes out of storage from physical `offset`.
    ///
    /// # Safety
    ///
    /// Caller must be the only consumer and the bytes must be in the filled
    /// region.
    #[inline]
    unsafe fn copy_out(&self, offset: usize, dest: &mut [u8]) {
        let first = dest.len().min(self.capacity - offset);
        let base = self.base();
        std::ptr::copy_nonoverlapping(base.add(offset), dest.as_mut_ptr(), first);
        std::ptr::copy_nonoverlapping(base, dest.as_mut_ptr().add(first), dest.len() - first);
    }

    /// Check there is room for `requested` bytes and return the current write
    /// position.
    #[inline]
    fn reserve(&self, requested: usize) -> Result<usize, RingBufferError> {
        // Only the producer stores write_pos, so its own load needs no ordering.
        let write = self.write_pos.load(Ordering::Relaxed);
        let read = self.read_pos.load(self.load_ordering());
        let available = self.capacity - self.distance(write, read);
        if requested > available {
            return Err(RingBufferError::InsufficientSpace {
                requested,
                available,
            });
        }
        Ok(write)
    }

    /// Check there are `requested` bytes buffered and return the current read
    /// position.
    #[inline]
    fn filled(&self, requested: usize) -> Result<usize, RingBufferError> {
        let read = self.read_pos.load(Ordering::Relaxed);
        let write = self.write_pos.load(self.load_ordering());
        let available = self.distance(write, read);
        if requested > available {
            return Err(RingBufferError::InsufficientData {
                requested,
                available,
            });
        }
        Ok(read)
    }

    /// # Safety
    ///
    /// Caller must be the only producer.
    pub(crate) unsafe fn produce_vectored(&self, sources: &[&[u8]]) -> Result<(), RingBufferError> {
        let total = sources
            .iter()
            .try_fold(0usize, |acc, src| acc.checked_add(src.len()))
            .unwrap_or(usize::MAX);
        let write = self.reserve(total)?;

        let mut offset = write % self.capacity;
        for src in sources {
            offset = self.copy_in(offset, src);
        }

        // Publish the record: the consumer sees the bytes before the position.
        self.write_pos
            .store(self.advance(write, total), self.store_ordering());
        Ok(())
    }

    /// # Safety
    ///
    /// Caller must be the only producer.
    pub(crate) unsafe fn produce_value(&self, value: u8, n: usize) -> Result<(), RingBufferError> {
        let write = self.reserve(n)?;
        self.fill(write % self.capacity, value, n);
        self.write_pos
            .store(self.advance(write, n), self.store_ordering());
        Ok(())
    }

    /// # Safety
    ///
    /// Caller must be the only consumer. With `advance == false` it is enough
    /// that no other consumer advances the read position concurrently.
    pub(crate) unsafe fn consume(&self, dest: &mut [u8], advance: bool) -> Result<(), RingBufferError> {
        let read = self.filled(dest.len())?;
        self.copy_out(read % self.capacity, dest);
        if advance {
            self.read_pos
                .store(self.advance(read, dest.len()), self.store_ordering());
        }
        Ok(())
    }

    /// # Safety
    ///
    /// Caller must be the only consumer.
    pub(crate) unsafe fn consume_skip(&self, len: usize) -> Result<(), RingBufferError> {
        let read = self.filled(len)?;
        self.read_pos
            .store(self.advance(read, len), self.store_ordering());
        Ok(())
    }

    /// # Safety
    ///
    /// No producer or consumer may be running.
    pub(crate) unsafe fn reset(&self) {
        self.write_pos.store(0, self.store_ordering());
        self.read_pos.store(0, self.store_ordering());
        debug!("Cleared ring buffer");
    }

    /// # Safety
    ///
    /// No producer or consumer may be running.
    pub(crate) unsafe fn set_atomic_shared(&self, enabled: bool) {
        debug!("Ring buffer atomic mode set to {}", enabled);
        self.atomic.store(enabled, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity)
            .field("write_pos", &self.write_pos)
            .field("read_pos", &self.read_pos)
            .field("atomic", &self.atomic)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
    }

    #[test]
    fn test_create_valid_capacity() {
        let rb = RingBuffer::new(256).unwrap();
        assert_eq!(rb.capacity(), 256);
        assert_eq!(rb.available_to_write(), 256);
        assert_eq!(rb.available_to_read(), 0);
        assert!(rb.is_atomic());
        assert!(rb.is_empty());
    }

    #[test]
    fn test_create_invalid_capacity() {
        assert_eq!(
            RingBuffer::new(100).unwrap_err(),
            RingBufferError::InvalidCapacity { capacity: 100 }
        );
        assert!(RingBuffer::new(0).is_err());
        assert!(RingBuffer::new(257).is_err());
        assert!(RingBuffer::new(768).is_ok());
    }

    #[test]
    fn test_write_read_roundtrip() {
        let mut rb = RingBuffer::new(256).unwrap();
        rb.write(b"hello").unwrap();
        assert_eq!(rb.available_to_read(), 5);
        assert_eq!(rb.available_to_write(), 251);

        let mut out = [0u8; 5];
        rb.read(&mut out).unwrap();
        assert_eq!(&out, b"hello");
        assert!(rb.is_empty());
    }

    #[test]
    fn test_vectored_write_keeps_order() {
        let mut rb = RingBuffer::new(256).unwrap();
        rb.write_vectored(&[b"head", b"", b"er", b"payload"]).unwrap();

        let mut out = [0u8; 13];
        rb.read(&mut out).unwrap();
        assert_eq!(&out, b"headerpayload");
    }

    #[test]
    fn test_vectored_write_is_all_or_nothing() {
        let mut rb = RingBuffer::new(256).unwrap();
        rb.write(&[0xAA; 200]).unwrap();

        let err = rb.write_vectored(&[&[1u8; 40], &[2u8; 40]]).unwrap_err();
        assert_eq!(
            err,
            RingBufferError::InsufficientSpace {
                requested: 80,
                available: 56
            }
        );
        assert_eq!(rb.available_to_read(), 200);

        let mut out = vec![0u8; 200];
        rb.read(&mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn test_vectored_write_fills_exactly() {
        let mut rb = RingBuffer::new(256).unwrap();
        let chunk = [0u8; 8];
        let sources: Vec<&[u8]> = (0..32).map(|_| &chunk[..]).collect();
        rb.write_vectored(&sources).unwrap();
        assert!(rb.is_full());
        assert!(rb.write(&[0]).is_err());
    }

    #[test]
    fn test_write_value() {
        let mut rb = RingBuffer::new(256).unwrap();
        rb.write_value(0x7F, 10).unwrap();
        assert!(rb.write_value(0, 247).is_err());
        assert_eq!(rb.available_to_read(), 10);

        let mut out = [0u8; 10];
        rb.read(&mut out).unwrap();
        assert_eq!(out, [0x7F; 10]);
    }

    #[test]
    fn test_read_insufficient_data_leaves_dest() {
        let mut rb = RingBuffer::new(256).unwrap();
        rb.write(b"abc").unwrap();

        let mut out = [9u8; 4];
        assert_eq!(
            rb.read(&mut out).unwrap_err(),
            RingBufferError::InsufficientData {
                requested: 4,
                available: 3
            }
        );
        assert_eq!(out, [9; 4]);
        assert_eq!(rb.available_to_read(), 3);
    }

    #[test]
    fn test_wrap_around() {
        let mut rb = RingBuffer::new(256).unwrap();
        let first = pattern(200, 1);
        rb.write(&first).unwrap();

        let mut head = vec![0u8; 150];
        rb.read(&mut head).unwrap();
        assert_eq!(head, first[..150]);

        // Crosses the physical end of storage.
        let second = pattern(100, 7);
        rb.write(&second).unwrap();
        assert_eq!(rb.available_to_read(), 150);

        let mut tail = vec![0u8; 150];
        rb.read(&mut tail).unwrap();
        assert_eq!(tail[..50], first[150..]);
        assert_eq!(tail[50..], second[..]);
    }

    #[test]
    fn test_write_value_wraps() {
        let mut rb = RingBuffer::new(256).unwrap();
        rb.write_value(1, 250).unwrap();
        rb.skip(250).unwrap();
        rb.write_value(2, 12).unwrap();

        let mut out = [0u8; 12];
        rb.read(&mut out).unwrap();
        assert_eq!(out, [2; 12]);
    }

    #[test]
    fn test_fill_to_capacity() {
        let mut rb = RingBuffer::new(512).unwrap();
        rb.write(&pattern(512, 3)).unwrap();
        assert!(rb.is_full());
        assert_eq!(rb.available_to_write(), 0);
        assert!(rb.write(&[0]).is_err());

        let mut out = vec![0u8; 512];
        rb.read(&mut out).unwrap();
        assert_eq!(out, pattern(512, 3));
        assert!(rb.is_empty());
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut rb = RingBuffer::new(256).unwrap();
        rb.write(b"peekaboo").unwrap();

        let mut out = [0u8; 4];
        rb.peek(&mut out).unwrap();
        assert_eq!(&out, b"peek");
        rb.peek(&mut out).unwrap();
        assert_eq!(&out, b"peek");
        assert_eq!(rb.available_to_read(), 8);

        rb.skip(4).unwrap();
        rb.read(&mut out).unwrap();
        assert_eq!(&out, b"aboo");
    }

    #[test]
    fn test_skip_insufficient_data() {
        let mut rb = RingBuffer::new(256).unwrap();
        rb.write(b"xy").unwrap();
        assert!(rb.skip(3).is_err());
        assert_eq!(rb.available_to_read(), 2);
    }

    #[test]
    fn test_clear() {
        let mut rb = RingBuffer::new(256).unwrap();
        rb.write(&[5; 123]).unwrap();
        rb.clear();
        assert_eq!(rb.available_to_read(), 0);
        assert_eq!(rb.available_to_write(), 256);
    }

    #[test]
    fn test_queries_are_idempotent() {
        let mut rb = RingBuffer::new(256).unwrap();
        rb.write(&[0; 42]).unwrap();
        for _ in 0..3 {
            assert_eq!(rb.available_to_read(), 42);
            assert_eq!(rb.available_to_write(), 214);
        }
    }

    #[test]
    fn test_plain_mode_single_thread() {
        let mut rb = RingBuffer::new(256).unwrap();
        rb.set_atomic(false);
        assert!(!rb.is_atomic());

        for round in 0..20u8 {
            let data = pattern(97, round);
            rb.write(&data).unwrap();
            let mut out = vec![0u8; 97];
            rb.read(&mut out).unwrap();
            assert_eq!(out, data);
        }
        assert_eq!(rb.available_to_write(), 256);
    }

    #[test]
    fn test_split_restores_atomic_mode() {
        let mut rb = RingBuffer::new(256).unwrap();
        rb.set_atomic(false);
        let (producer, consumer) = rb.split();
        assert!(producer.is_atomic());
        assert!(consumer.is_atomic());
    }

    #[test]
    fn test_positions_wrap_at_counter_limit() {
        let mut rb = RingBuffer::new(768).unwrap();
        // Park both positions just before the counter limit.
        let near_end = rb.wrap - 10;
        *rb.write_pos.get_mut() = near_end;
        *rb.read_pos.get_mut() = near_end;
        assert_eq!(rb.available_to_read(), 0);

        let data = pattern(300, 11);
        rb.write(&data).unwrap();
        assert!(rb.write_pos.load(Ordering::Relaxed) < near_end);
        assert_eq!(rb.available_to_read(), 300);
        assert_eq!(rb.available_to_write(), 468);

        let mut out = vec![0u8; 300];
        rb.read(&mut out).unwrap();
        assert_eq!(out, data);
        assert!(rb.is_empty());
    }
}
