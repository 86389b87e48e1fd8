// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! rtring-stress - Drive a producer/consumer pair through the ring buffer.
//!
//! Reads `stress.toml` from the platform config directory, or from the path
//! given as the first argument, and exits non-zero if any record comes back
//! torn or the checksums disagree.

mod config;
mod runner;

use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("rtring=debug".parse()?)
                .add_directive("rtring_stress=debug".parse()?),
        )
        .init();

    info!("rtring stress starting...");

    let stress_config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => config::load_from(&path)?,
        None => config::ConfigManager::new()?.load_stress_config()?,
    };

    match runner::run(&stress_config) {
        Ok(report) => {
            let secs = report.elapsed.as_secs_f64().max(f64::EPSILON);
            info!(
                "Moved {} records ({} bytes) in {:.3}s, {:.1} MiB/s, checksum {:#018x}",
                report.records,
                report.bytes,
                secs,
                report.bytes as f64 / secs / (1024.0 * 1024.0),
                report.checksum
            );
            info!(
                "Retries: producer {}, consumer {} ({})",
                report.producer_retries,
                report.consumer_retries,
                if report.threaded { "threaded" } else { "interleaved" }
            );
            Ok(())
        }
        Err(e) => {
            error!("Stress run failed: {}", e);
            Err(e.into())
        }
    }
}
