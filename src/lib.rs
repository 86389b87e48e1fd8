// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! rtring - Lock-free byte ring buffer for real-time audio threads.
//!
//! One producer thread and one consumer thread move bytes through a fixed
//! capacity buffer without blocking, locking or allocating. Multi-part
//! writes are all-or-nothing, so a header and payload written together are
//! never seen apart.
//!
//! ```
//! use rtring::realtime::RingBuffer;
//!
//! let mut rb = RingBuffer::new(256).unwrap();
//! rb.write_value(0, 64).unwrap();
//! assert_eq!(rb.available_to_read(), 64);
//! assert_eq!(rb.available_to_write(), 192);
//! ```

pub mod config;
pub mod error;
pub mod realtime;

pub use config::RingConfig;
pub use error::RingBufferError;
pub use realtime::{Consumer, Producer, RingBuffer};
