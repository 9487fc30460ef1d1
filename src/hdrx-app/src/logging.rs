// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Parse a level name, falling back to INFO when absent or invalid.
pub fn parse_level(log_level: Option<&str>) -> Level {
    log_level
        .and_then(|s| s.trim().parse::<Level>().ok())
        .unwrap_or(Level::INFO)
}

/// Install the global fmt subscriber.
///
/// Logs go to stderr so that stdout stays free for event output.
pub fn init_logging(log_level: Option<&str>) {
    let level = parse_level(log_level);

    FmtSubscriber::builder()
        .with_target(false)
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}
