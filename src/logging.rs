//! Log routing.
//!
//! Every record goes to the console logger selected by `[logging] output`.
//! With `[logging] dir` set, records from a worker target are also appended
//! to `<dir>/<target>.log`, so each worker's history can be read on its own:
//!
//! ```text
//! log::info!(target: "scanner", ..) ──▶ console
//!                                   └─▶ <dir>/scanner.log
//! ```

use crate::config::LoggingConfig;
use crate::error::{Error, Result};
use env_logger::fmt::Formatter;
use env_logger::{Builder, Env, Logger, Target};
use log::{LevelFilter, Log, Metadata, Record};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Log targets that get a file of their own
pub const WORKER_TARGETS: [&str; 6] = [
    "scanner",
    "camera",
    "drive",
    "explorer",
    "supervisor",
    "control",
];

fn format_record(buf: &mut Formatter, record: &Record) -> io::Result<()> {
    writeln!(
        buf,
        "{} [{}] {} - {}",
        buf.timestamp_millis(),
        record.level(),
        record.target(),
        record.args()
    )
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Console logger plus optional per-worker files
pub struct RoutedLogger {
    console: Logger,
    files: Vec<(&'static str, Logger)>,
}

impl RoutedLogger {
    /// Build without installing. `RUST_LOG` overrides `config.level` on the
    /// console only.
    pub fn build(config: &LoggingConfig) -> Result<Self> {
        let mut console = Builder::from_env(Env::default().default_filter_or(&config.level));
        console.format(format_record);
        match config.output.as_str() {
            "stdout" => console.target(Target::Stdout),
            "stderr" => console.target(Target::Stderr),
            path => console.target(Target::Pipe(Box::new(open_append(Path::new(path))?))),
        };

        let mut files = Vec::new();
        if let Some(dir) = &config.dir {
            fs::create_dir_all(dir)?;
            for target in WORKER_TARGETS {
                let file = open_append(&worker_log_path(dir, target))?;
                let logger = Builder::new()
                    .parse_filters(&config.level)
                    .format(format_record)
                    .target(Target::Pipe(Box::new(file)))
                    .build();
                files.push((target, logger));
            }
        }

        Ok(Self {
            console: console.build(),
            files,
        })
    }

    /// Most verbose level any destination accepts
    pub fn max_level(&self) -> LevelFilter {
        self.files
            .iter()
            .map(|(_, logger)| logger.filter())
            .fold(self.console.filter(), Ord::max)
    }

    fn file_for(&self, target: &str) -> Option<&Logger> {
        self.files
            .iter()
            .find(|(name, _)| *name == target)
            .map(|(_, logger)| logger)
    }
}

impl Log for RoutedLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.console.enabled(metadata)
            || self
                .file_for(metadata.target())
                .is_some_and(|file| file.enabled(metadata))
    }

    fn log(&self, record: &Record) {
        self.console.log(record);
        if let Some(file) = self.file_for(record.target()) {
            file.log(record);
        }
    }

    fn flush(&self) {
        self.console.flush();
        for (_, file) in &self.files {
            file.flush();
        }
    }
}

/// File a worker target logs to under `dir`
pub fn worker_log_path(dir: &Path, target: &str) -> PathBuf {
    dir.join(format!("{}.log", target))
}

/// Install the routed logger as the global `log` backend
pub fn init(config: &LoggingConfig) -> Result<()> {
    let logger = RoutedLogger::build(config)?;
    let max_level = logger.max_level();
    log::set_boxed_logger(Box::new(logger))
        .map_err(|e| Error::Config(format!("logger already installed: {}", e)))?;
    log::set_max_level(max_level);
    Ok(())
}
