// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Producer/consumer stress run over framed records.
//!
//! Each record is a 4-byte little-endian length followed by a random payload,
//! written with one vectored write. The consumer peeks the length, then reads
//! the whole record at once: if the header is visible, the payload must be
//! too.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rtring::{Consumer, Producer, RingBuffer, RingBufferError};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::StressConfig;

const HEADER_LEN: usize = 4;

#[derive(Debug, Error)]
pub enum StressError {
    #[error("Ring buffer error: {0}")]
    Ring(#[from] RingBufferError),
    #[error("Record of {record} bytes cannot fit in a {capacity} byte buffer")]
    RecordTooLarge { record: usize, capacity: usize },
    #[error("Record header announced {announced} bytes but the read failed: {source}")]
    TornRecord {
        announced: usize,
        #[source]
        source: RingBufferError,
    },
    #[error("Failed to spawn producer thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Producer thread panicked")]
    ProducerPanicked,
    #[error("Checksum mismatch: wrote {written:#018x}, read {read:#018x}")]
    ChecksumMismatch { written: u64, read: u64 },
}

/// Outcome of a completed stress run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StressReport {
    pub records: u64,
    pub bytes: u64,
    pub producer_retries: u64,
    pub consumer_retries: u64,
    pub checksum: u64,
    pub threaded: bool,
    pub elapsed: Duration,
}

/// Order-sensitive checksum over a byte stream.
pub fn checksum(acc: u64, bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(acc, |acc, &b| acc.wrapping_mul(0x100_0000_01b3).wrapping_add(b as u64))
}

/// Write side of a stress run.
trait RecordSink {
    fn write_record(&mut self, parts: &[&[u8]]) -> Result<(), RingBufferError>;
}

/// Read side of a stress run.
trait RecordSource {
    fn peek_header(&self, dest: &mut [u8]) -> Result<(), RingBufferError>;
    fn read_record(&mut self, dest: &mut [u8]) -> Result<(), RingBufferError>;
}

impl RecordSink for Producer {
    fn write_record(&mut self, parts: &[&[u8]]) -> Result<(), RingBufferError> {
        self.write_vectored(parts)
    }
}

impl RecordSink for RingBuffer {
    fn write_record(&mut self, parts: &[&[u8]]) -> Result<(), RingBufferError> {
        self.write_vectored(parts)
    }
}

impl RecordSource for Consumer {
    fn peek_header(&self, dest: &mut [u8]) -> Result<(), RingBufferError> {
        self.peek(dest)
    }

    fn read_record(&mut self, dest: &mut [u8]) -> Result<(), RingBufferError> {
        self.read(dest)
    }
}

impl RecordSource for RingBuffer {
    fn peek_header(&self, dest: &mut [u8]) -> Result<(), RingBufferError> {
        self.peek(dest)
    }

    fn read_record(&mut self, dest: &mut [u8]) -> Result<(), RingBufferError> {
        self.read(dest)
    }
}

/// Generates records and pushes them into a sink.
struct Writer {
    rng: StdRng,
    payload: Vec<u8>,
    max_record: usize,
    /// Length of the generated but not yet written record.
    pending: Option<usize>,
    remaining: u64,
    retries: u64,
    checksum: u64,
}

impl Writer {
    fn new(config: &StressConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            payload: vec![0; config.max_record],
            max_record: config.max_record,
            pending: None,
            remaining: config.iterations,
            retries: 0,
            checksum: 0,
        }
    }

    fn is_done(&self) -> bool {
        self.remaining == 0
    }

    /// Try to write the next record. Returns `false` if the sink was full.
    fn step(&mut self, sink: &mut impl RecordSink) -> Result<bool, StressError> {
        let len = match self.pending {
            Some(len) => len,
            None => {
                let len = self.rng.gen_range(1..=self.max_record);
                self.rng.fill(&mut self.payload[..len]);
                self.pending = Some(len);
                len
            }
        };

        let header = (len as u32).to_le_bytes();
        match sink.write_record(&[&header, &self.payload[..len]]) {
            Ok(()) => {
                self.checksum = checksum(self.checksum, &self.payload[..len]);
                self.pending = None;
                self.remaining -= 1;
                Ok(true)
            }
            Err(e) if e.is_retryable() => {
                self.retries += 1;
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Pulls records out of a source and verifies them.
struct Reader {
    record: Vec<u8>,
    records: u64,
    bytes: u64,
    retries: u64,
    checksum: u64,
}

impl Reader {
    fn new(config: &StressConfig) -> Self {
        Self {
            record: vec![0; HEADER_LEN + config.max_record],
            records: 0,
            bytes: 0,
            retries: 0,
            checksum: 0,
        }
    }

    /// Try to read the next record. Returns `false` if none was available.
    fn step(&mut self, source: &mut impl RecordSource) -> Result<bool, StressError> {
        let mut header = [0u8; HEADER_LEN];
        if source.peek_header(&mut header).is_err() {
            self.retries += 1;
            return Ok(false);
        }

        let announced = u32::from_le_bytes(header) as usize;
        let total = HEADER_LEN + announced;
        if total > self.record.len() {
            return Err(StressError::RecordTooLarge {
                record: total,
                capacity: self.record.len(),
            });
        }

        source
            .read_record(&mut self.record[..total])
            .map_err(|source| StressError::TornRecord { announced, source })?;

        self.checksum = checksum(self.checksum, &self.record[HEADER_LEN..total]);
        self.records += 1;
        self.bytes += total as u64;
        Ok(true)
    }
}

/// Run a stress pass described by `config`.
///
/// In atomic mode the producer runs on its own thread. In plain mode both
/// sides are interleaved on the calling thread.
pub fn run(config: &StressConfig) -> Result<StressReport, StressError> {
    let capacity = config.ring.capacity;
    let record = HEADER_LEN + config.max_record;
    if config.max_record == 0 || record > capacity {
        return Err(StressError::RecordTooLarge { record, capacity });
    }

    let buffer = config.ring.build()?;
    info!(
        "Stress run: {} records up to {} bytes through a {} byte buffer (atomic: {})",
        config.iterations,
        config.max_record,
        capacity,
        buffer.is_atomic()
    );

    let start = Instant::now();
    let threaded = buffer.is_atomic();
    let (writer, reader) = if threaded {
        run_threaded(buffer, config)?
    } else {
        run_interleaved(buffer, config)?
    };
    let elapsed = start.elapsed();

    if writer.checksum != reader.checksum {
        return Err(StressError::ChecksumMismatch {
            written: writer.checksum,
            read: reader.checksum,
        });
    }

    let report = StressReport {
        records: reader.records,
        bytes: reader.bytes,
        producer_retries: writer.retries,
        consumer_retries: reader.retries,
        checksum: reader.checksum,
        threaded,
        elapsed,
    };
    debug!("Stress report: {:?}", report);
    Ok(report)
}

fn run_threaded(buffer: RingBuffer, config: &StressConfig) -> Result<(Writer, Reader), StressError> {
    let (mut producer, mut consumer) = buffer.split();
    let mut writer = Writer::new(config);
    let mut reader = Reader::new(config);

    let handle = thread::Builder::new()
        .name("rtring-producer".to_string())
        .spawn(move || -> Result<Writer, StressError> {
            while !writer.is_done() {
                if !writer.step(&mut producer)? {
                    thread::yield_now();
                }
            }
            Ok(writer)
        })?;

    while reader.records < config.iterations {
        if !reader.step(&mut consumer)? {
            if handle.is_finished() && consumer.is_empty() {
                break;
            }
            thread::yield_now();
        }
    }

    let writer = handle.join().map_err(|_| StressError::ProducerPanicked)??;
    Ok((writer, reader))
}

fn run_interleaved(
    mut buffer: RingBuffer,
    config: &StressConfig,
) -> Result<(Writer, Reader), StressError> {
    let mut writer = Writer::new(config);
    let mut reader = Reader::new(config);

    while reader.records < config.iterations {
        // Fill until full, then drain one record.
        while !writer.is_done() && writer.step(&mut buffer)? {}
        reader.step(&mut buffer)?;
    }
    Ok((writer, reader))
}
