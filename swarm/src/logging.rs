//! Logger setup
//!
//! Logs go to stderr by default. With a log directory they go to a fresh file
//! named after the start time instead. `RUST_LOG` controls the filter either
//! way and defaults to `info`.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use env_logger::{Env, Target};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("logger already initialized: {0}")]
    AlreadyInitialized(#[from] log::SetLoggerError),
}

pub fn init(log_dir: Option<&Path>) -> Result<(), LoggingError> {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));

    if let Some(log_dir) = log_dir {
        let io_error = |source| LoggingError::Io {
            path: log_dir.to_path_buf(),
            source,
        };
        std::fs::create_dir_all(log_dir).map_err(io_error)?;

        let path = log_dir.join(log_file_name(SystemTime::now()));
        let file = File::create(&path).map_err(|source| LoggingError::Io { path, source })?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder.try_init()?;
    Ok(())
}

fn log_file_name(now: SystemTime) -> String {
    let seconds = now
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);
    format!("swarm-{seconds}.log")
}
