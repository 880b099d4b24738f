/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Tournesol Logging Module
//!
//! Process-wide logger for the controller. Log lines are the only place where
//! pipeline outcomes become visible, so every stage writes through here.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tournesol_utils::logging::{self, prelude::*};
//!
//! logging::init_with_format("info", "json").expect("Failed to initialize logger");
//! info!("[{}] fetching sources for namespace {}", identity, namespace);
//! ```
//!
//! The level can be changed at runtime with [`update_log_level`]. Unknown level
//! strings fall back to `info`.
//!
//! ## Formats
//!
//! - `text`: `2025-01-01 12:00:00 - INFO [target]: message`
//! - `json`: one object per line with `timestamp`, `level`, `target`, `message`,
//!   `module`, `file` and `line`

use log::{LevelFilter, Metadata, Record, SetLoggerError};
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub use log::{debug, error, info, trace, warn};

static LOGGER: TournesolLogger = TournesolLogger;
static CURRENT_LEVEL: AtomicUsize = AtomicUsize::new(LevelFilter::Info as usize);
static JSON_FORMAT: AtomicBool = AtomicBool::new(false);
static INIT: OnceCell<()> = OnceCell::new();

/// Logger writing to stderr in either text or JSON form
pub struct TournesolLogger;

impl log::Log for TournesolLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= level_filter_from_usize(CURRENT_LEVEL.load(Ordering::Relaxed))
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if JSON_FORMAT.load(Ordering::Relaxed) {
            eprintln!("{}", json_line(record));
        } else {
            eprintln!(
                "{} - {} [{}]: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}

fn json_line(record: &Record) -> serde_json::Value {
    serde_json::json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "level": record.level().to_string().to_lowercase(),
        "target": record.target(),
        "message": record.args().to_string(),
        "module": record.module_path(),
        "file": record.file(),
        "line": record.line()
    })
}

/// Initializes the logger with the given level and the text format.
pub fn init(level: &str) -> Result<(), SetLoggerError> {
    init_with_format(level, "text")
}

/// Initializes the logger with the specified level and format.
///
/// Safe to call more than once: the logger is installed on the first call and
/// later calls only change the level and format.
///
/// # Arguments
/// * `level` - "off", "error", "warn", "info", "debug" or "trace"
/// * `format` - "text" for human-readable, "json" for structured JSON
pub fn init_with_format(level: &str, format: &str) -> Result<(), SetLoggerError> {
    let level_filter = str_to_level_filter(level);
    let use_json = format.eq_ignore_ascii_case("json");

    INIT.get_or_try_init(|| log::set_logger(&LOGGER))?;

    JSON_FORMAT.store(use_json, Ordering::Relaxed);
    CURRENT_LEVEL.store(level_filter as usize, Ordering::Relaxed);
    log::set_max_level(level_filter);
    Ok(())
}

/// Updates the current log level.
pub fn update_log_level(level: &str) {
    let new_level = str_to_level_filter(level);
    CURRENT_LEVEL.store(new_level as usize, Ordering::Relaxed);
    log::set_max_level(new_level);
}

/// Returns the level currently in effect.
pub fn current_level() -> LevelFilter {
    level_filter_from_usize(CURRENT_LEVEL.load(Ordering::Relaxed))
}

fn str_to_level_filter(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

fn level_filter_from_usize(v: usize) -> LevelFilter {
    match v {
        0 => LevelFilter::Off,
        1 => LevelFilter::Error,
        2 => LevelFilter::Warn,
        3 => LevelFilter::Info,
        4 => LevelFilter::Debug,
        5 => LevelFilter::Trace,
        _ => LevelFilter::Off,
    }
}

pub mod prelude {
    pub use log::{debug, error, info, trace, warn};
}
