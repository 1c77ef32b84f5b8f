//! Logging Infrastructure
//!
//! Structured logging setup with support for both development and production environments.

use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initialize the logger
pub fn init_logger() {
    init_logger_with_file(None, None, None);
}

/// Initialize the logger with optional JSON output and file output
///
/// `RUST_LOG` overrides `log_level` when set. Calling this twice is harmless;
/// the second call keeps the first subscriber.
pub fn init_logger_with_file(log_level: Option<&str>, json: Option<bool>, log_dir: Option<&str>) {
    let level = log_level.unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    // Add file output if log_dir is provided
    let file_appender = log_dir.and_then(|dir| {
        let log_path = Path::new(dir);
        if !log_path.exists() && std::fs::create_dir_all(log_path).is_err() {
            return None;
        }
        log_path
            .to_str()
            .map(|dir_str| tracing_appender::rolling::daily(dir_str, "market-server"))
    });

    let result = match (json.unwrap_or(false), file_appender) {
        (true, Some(appender)) => builder.json().with_writer(appender).try_init(),
        (true, None) => builder.json().try_init(),
        (false, Some(appender)) => builder.with_ansi(false).with_writer(appender).try_init(),
        (false, None) => builder.try_init(),
    };

    if let Err(e) = result {
        eprintln!("Logger already initialized: {}", e);
    }
}

/// Remove rolled log files older than `days`
pub fn cleanup_old_logs(log_dir: &str, days: u64) -> std::io::Result<usize> {
    let cutoff = std::time::SystemTime::now()
        .checked_sub(std::time::Duration::from_secs(days * 24 * 60 * 60))
        .unwrap_or(std::time::UNIX_EPOCH);

    let mut removed = 0;
    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        let is_log = entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.starts_with("market-server"));
        if meta.is_file() && is_log && meta.modified()? < cutoff {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}
