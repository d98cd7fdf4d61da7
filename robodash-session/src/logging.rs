//! Logger setup for dashboards embedding the session layer.
//!
//! Lines look like `[2024-05-01 12:00:00.123] [INFO ] robodash_session::session: ...`
//! and go to stderr, or to an append-only file when one is configured.

use std::fs::OpenOptions;
use std::io::Write;

use log::LevelFilter;
use once_cell::sync::OnceCell;

use crate::config::LoggingConfig;

/// Set once the global logger is ours.
static INITIALIZED: OnceCell<()> = OnceCell::new();

/// Install the global logger.
///
/// `RUST_LOG` directives are applied on top of the configured level.
/// Returns true if our logger is active, including when an earlier call
/// already installed it; false if some other logger got there first.
pub fn init_logging(config: &LoggingConfig) -> bool {
    if INITIALIZED.get().is_some() {
        return true;
    }

    let mut builder = env_logger::Builder::new();
    builder.filter_level(LevelFilter::Info);
    if let Some(level) = &config.level {
        builder.parse_filters(level);
    }
    builder.parse_env("RUST_LOG");

    builder.format(|buf, record| {
        writeln!(
            buf,
            "[{}] [{:<5}] {}: {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    });

    if let Some(path) = &config.file {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!("Failed to open log file {:?}: {}", path, e),
        }
    }

    match builder.try_init() {
        Ok(()) => {
            let _ = INITIALIZED.set(());
            log::info!("Logging initialized (level {:?})", config.level);
            true
        }
        Err(_) => false,
    }
}
