// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Real-time safe byte transport between two threads.
//!
//! # Real-Time Safety
//!
//! The audio thread has strict requirements:
//! - No memory allocation
//! - No locks (mutexes, RwLocks)
//! - No system calls (file I/O, network)
//! - Bounded execution time
//!
//! Once created, every read, write and query on the ring buffer meets them.
//! Failures are reported immediately; retrying is up to the caller.

mod halves;
pub mod ringbuf;

pub use halves::{Consumer, Producer};
pub use ringbuf::{RingBuffer, CAPACITY_ALIGNMENT};
