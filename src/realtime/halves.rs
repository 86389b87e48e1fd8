// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Producer and consumer handles for a split [`RingBuffer`].

use std::sync::Arc;

use super::ringbuf::RingBuffer;
use crate::error::RingBufferError;

/// Writer handle for the ring buffer.
///
/// Only one producer exists per buffer; it cannot be cloned.
#[derive(Debug)]
pub struct Producer {
    inner: Arc<RingBuffer>,
}

impl Producer {
    pub(super) fn new(inner: Arc<RingBuffer>) -> Self {
        Self { inner }
    }

    /// Write all `sources` in order as one indivisible record.
    ///
    /// The consumer either sees every byte of the record or none of it.
    #[inline]
    pub fn write_vectored(&mut self, sources: &[&[u8]]) -> Result<(), RingBufferError> {
        // SAFETY: `Producer` is unique and borrowed mutably.
        unsafe { self.inner.produce_vectored(sources) }
    }

    /// Write a single slice.
    #[inline]
    pub fn write(&mut self, src: &[u8]) -> Result<(), RingBufferError> {
        self.write_vectored(&[src])
    }

    /// Write `n` copies of `value`, e.g. silence padding.
    #[inline]
    pub fn write_value(&mut self, value: u8, n: usize) -> Result<(), RingBufferError> {
        // SAFETY: `Producer` is unique and borrowed mutably.
        unsafe { self.inner.produce_value(value, n) }
    }

    /// Number of bytes that can currently be written.
    #[inline]
    pub fn available_to_write(&self) -> usize {
        self.inner.available_to_write()
    }

    /// Number of bytes the consumer can currently read.
    #[inline]
    pub fn available_to_read(&self) -> usize {
        self.inner.available_to_read()
    }

    /// Check if the buffer has no free space.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.inner.is_full()
    }

    /// Get the capacity of the buffer in bytes.
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Whether position updates use acquire/release ordering.
    pub fn is_atomic(&self) -> bool {
        self.inner.is_atomic()
    }

    /// Enable or disable ordered position updates.
    ///
    /// # Safety
    ///
    /// The consumer must not run concurrently with any operation on this
    /// buffer while the flag changes, or at all while atomic mode is off.
    pub unsafe fn set_atomic(&self, enabled: bool) {
        self.inner.set_atomic_shared(enabled);
    }

    /// Discard everything and reset both positions to zero.
    ///
    /// # Safety
    ///
    /// The consumer must be quiesced (e.g. the audio callback paused).
    pub unsafe fn clear(&self) {
        self.inner.reset();
    }
}

/// Reader handle for the ring buffer.
///
/// Only one consumer exists per buffer; it cannot be cloned.
#[derive(Debug)]
pub struct Consumer {
    inner: Arc<RingBuffer>,
}

impl Consumer {
    pub(super) fn new(inner: Arc<RingBuffer>) -> Self {
        Self { inner }
    }

    /// Fill `dest` completely, or copy nothing.
    #[inline]
    pub fn read(&mut self, dest: &mut [u8]) -> Result<(), RingBufferError> {
        // SAFETY: `Consumer` is unique and borrowed mutably.
        unsafe { self.inner.consume(dest, true) }
    }

    /// Copy the next `dest.len()` bytes without consuming them.
    #[inline]
    pub fn peek(&self, dest: &mut [u8]) -> Result<(), RingBufferError> {
        // SAFETY: only this consumer advances the read position, and peeking
        // does not advance it.
        unsafe { self.inner.consume(dest, false) }
    }

    /// Discard `len` bytes without copying them.
    #[inline]
    pub fn skip(&mut self, len: usize) -> Result<(), RingBufferError> {
        // SAFETY: `Consumer` is unique and borrowed mutably.
        unsafe { self.inner.consume_skip(len) }
    }

    /// Number of bytes that can currently be read.
    #[inline]
    pub fn available_to_read(&self) -> usize {
        self.inner.available_to_read()
    }

    /// Number of bytes the producer can currently write.
    #[inline]
    pub fn available_to_write(&self) -> usize {
        self.inner.available_to_write()
    }

    /// Check if the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Get the capacity of the buffer in bytes.
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Whether position updates use acquire/release ordering.
    pub fn is_atomic(&self) -> bool {
        self.inner.is_atomic()
    }

    /// Enable or disable ordered position updates.
    ///
    /// # Safety
    ///
    /// Same contract as [`Producer::set_atomic`].
    pub unsafe fn set_atomic(&self, enabled: bool) {
        self.inner.set_atomic_shared(enabled);
    }

    /// Discard everything and reset both positions to zero.
    ///
    /// # Safety
    ///
    /// The producer must be quiesced.
    pub unsafe fn clear(&self) {
        self.inner.reset();
    }
}
