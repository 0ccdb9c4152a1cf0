//! Logger setup for the command-line tool

use log::LevelFilter;
use std::io::Write;

/// How chatty the mount should be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only (`-q`)
    Quiet,
    #[default]
    Normal,
    /// Per-entry tracing (`-d`)
    Debug,
}

impl Verbosity {
    pub fn level_filter(self) -> LevelFilter {
        match self {
            Verbosity::Quiet => LevelFilter::Error,
            Verbosity::Normal => LevelFilter::Info,
            Verbosity::Debug => LevelFilter::Debug,
        }
    }
}

/// Install an env_logger writing to stderr.
///
/// `RUST_LOG` overrides the level picked from the command line.
pub fn init(verbosity: Verbosity) {
    let result = env_logger::Builder::new()
        .filter_level(verbosity.level_filter())
        .parse_default_env()
        .format(|buf, record| {
            writeln!(buf, "[{}] {}: {}", record.level(), record.target(), record.args())
        })
        .try_init();
    if let Err(e) = result {
        eprintln!("logger already installed: {}", e);
    }
}
