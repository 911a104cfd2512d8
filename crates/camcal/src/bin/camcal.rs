use std::{
    error::Error,
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};

use camcal::{CalibrationEngine, CalibrationRequest, EngineConfig};
use camcal_core::TargetConfigRecord;
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, LevelFilter};

/// Camera calibration from chessboard and ChArUco images.
#[derive(Debug, Parser)]
#[command(author, version, about = "Camera intrinsics calibration")]
struct Cli {
    /// Logger verbosity; defaults to `CAMCAL_LOG`, then `info`.
    #[arg(long, value_enum, global = true)]
    log_level: Option<LogLevel>,

    /// Emit JSON log lines (tracing builds only).
    #[cfg(feature = "tracing")]
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Calibrate from a set of images and print the result record.
    Calibrate {
        /// Engine configuration JSON; must contain a `target`.
        #[arg(long)]
        config: PathBuf,
        /// Replaces the per-target minimum view count.
        #[arg(long)]
        min_views: Option<usize>,
        /// Write the record here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Check whether the configured target is visible in one image.
    Detect {
        #[arg(long)]
        config: PathBuf,
        image: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

fn init_logging(cli: &Cli) -> Result<(), Box<dyn Error>> {
    #[cfg(feature = "tracing")]
    {
        // RUST_LOG drives the filter; the level flag caps the log bridge.
        let _ = tracing_log::LogTracer::init();
        camcal_core::init_tracing(cli.log_json);
        log::set_max_level(cli.log_level.map_or(LevelFilter::Trace, LevelFilter::from));
    }
    #[cfg(not(feature = "tracing"))]
    match cli.log_level {
        Some(level) => camcal_core::init_with_level(level.into())?,
        None => camcal_core::init_from_env(LevelFilter::Info)?,
    }
    Ok(())
}

fn load_engine(path: &Path) -> Result<(CalibrationEngine, TargetConfigRecord), Box<dyn Error>> {
    let config = EngineConfig::load_json(path)?;
    let target = config
        .target
        .clone()
        .ok_or_else(|| format!("{}: no `target` section", path.display()))?;
    Ok((CalibrationEngine::new(config), target))
}

fn main() -> ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn try_main() -> Result<ExitCode, Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    match cli.command {
        Command::Calibrate {
            config,
            min_views,
            output,
            images,
        } => {
            let (engine, target) = load_engine(&config)?;
            let request = CalibrationRequest {
                image_paths: images,
                target_config: target,
                min_views_override: min_views,
            };

            let report = engine.calibrate(&request);
            let summary = &report.diagnostics.extraction;
            info!(
                "{} of {} images contributed a view",
                summary.accepted, summary.attempted
            );
            let json = serde_json::to_string_pretty(&report.record())?;
            match output {
                Some(path) => fs::write(&path, json)?,
                None => println!("{json}"),
            }
            Ok(if report.result.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }
        Command::Detect { config, image } => {
            let (engine, target) = load_engine(&config)?;
            let found = engine.detect_target(&target, &image)?;
            println!("{}", if found { "found" } else { "not found" });
            Ok(ExitCode::SUCCESS)
        }
    }
}
