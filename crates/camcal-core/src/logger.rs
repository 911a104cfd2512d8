//! Stderr logger scoped to the calibration crates.
//!
//! Records from `camcal*` targets pass at the configured level; records from
//! dependencies (image decoders, rayon) are held at `warn` or quieter. Lines
//! look like `[  1.234s  INFO engine] 12 of 14 images contributed a view`,
//! with the `camcal::`/`camcal_*::` prefix dropped from the target.
//!
//! Install it once at startup with [`init_with_level`] or [`init_from_env`];
//! later calls are no-ops.

use std::io::Write;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable read by [`init_from_env`].
pub const LOG_ENV: &str = "CAMCAL_LOG";

const TARGET_PREFIX: &str = "camcal";
const DEPENDENCY_CEILING: LevelFilter = LevelFilter::Warn;

struct CamcalLogger {
    level: LevelFilter,
    started: Instant,
}

impl CamcalLogger {
    fn passes(&self, level: Level, target: &str) -> bool {
        level <= level_for_target(self.level, target)
    }
}

/// Effective level for records from `target` when the run level is `level`.
fn level_for_target(level: LevelFilter, target: &str) -> LevelFilter {
    if target.starts_with(TARGET_PREFIX) {
        level
    } else {
        level.min(DEPENDENCY_CEILING)
    }
}

/// Target with the crate prefix removed: `camcal_solver::lm` becomes `solver::lm`.
fn short_target(target: &str) -> &str {
    match target.strip_prefix(TARGET_PREFIX) {
        Some(rest) => rest
            .strip_prefix("::")
            .or_else(|| rest.strip_prefix('_'))
            .filter(|s| !s.is_empty())
            .unwrap_or(target),
        None => target,
    }
}

fn format_line(elapsed_s: f64, level: Level, target: &str, message: &str) -> String {
    format!(
        "[{:7.3}s {:>5} {}] {}",
        elapsed_s,
        level,
        short_target(target),
        message
    )
}

impl Log for CamcalLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.passes(metadata.level(), metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(
            self.started.elapsed().as_secs_f64(),
            record.level(),
            record.target(),
            &record.args().to_string(),
        );
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<CamcalLogger> = OnceLock::new();

/// Install the logger; `camcal*` records pass at `level`.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| CamcalLogger {
            level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

/// Parse a level name such as `debug` or `off`; `None` for anything else.
pub fn parse_level(value: &str) -> Option<LevelFilter> {
    LevelFilter::from_str(value.trim()).ok()
}

/// Install the logger at the level named by `CAMCAL_LOG`, or `default` when
/// the variable is unset or unparsable.
pub fn init_from_env(default: LevelFilter) -> Result<(), log::SetLoggerError> {
    let level = std::env::var(LOG_ENV)
        .ok()
        .and_then(|v| parse_level(&v))
        .unwrap_or(default);
    init_with_level(level)
}

/// Install a `tracing` fmt subscriber filtered by `RUST_LOG`.
///
/// Without `RUST_LOG`, `camcal*` targets log at `info` and everything else
/// at `warn`, matching the plain logger.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    // Directive targets match by prefix, so `camcal` covers every crate.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,camcal=info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE);
    let _ = if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init()
    };
}
