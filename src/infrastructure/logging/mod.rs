use chrono::Local;
use env_logger::Builder;
use log::LevelFilter;
use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

static LOG_FILE_WRITER: Mutex<Option<BufWriter<File>>> = Mutex::new(None);
static LOGGER_INITIALIZED: Mutex<bool> = Mutex::new(false);

const DEFAULT_RETENTION_HOURS: u64 = 72;
const SECONDS_PER_HOUR: u64 = 3_600;

#[derive(Debug)]
struct LoggingConfig {
    file_logging_enabled: bool,
    retention: Duration,
    log_dir: PathBuf,
    deferred_warnings: Vec<String>,
}

/// Get the application's log directory
pub fn get_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ankerwerk")
        .join("logs")
}

/// Initialize logging to console and, in debug builds or when enabled via
/// `ANKERWERK_ENABLE_LOGS`, a timestamped file under the log directory.
pub fn init_logging() {
    // Make idempotent: avoid double init in tests or multiple starts
    {
        let mut initialized = LOGGER_INITIALIZED.lock().unwrap();
        if *initialized {
            return;
        }
        *initialized = true;
    }
    let mut config = resolve_logging_config();
    let mut log_path: Option<PathBuf> = None;

    if config.file_logging_enabled {
        if let Err(e) = fs::create_dir_all(&config.log_dir) {
            config.deferred_warnings.push(format!(
                "Failed to create log directory {}: {e}",
                config.log_dir.display()
            ));
        } else {
            let cleanup_warnings = cleanup_old_logs(&config.log_dir, config.retention);
            config.deferred_warnings.extend(cleanup_warnings);

            let candidate = config.log_dir.join(format!(
                "ankerwerk-{}.log",
                Local::now().format("%Y%m%d-%H%M%S")
            ));

            match OpenOptions::new()
                .create(true)
                .append(true)
                .open(&candidate)
            {
                Ok(file) => {
                    if let Ok(mut guard) = LOG_FILE_WRITER.lock() {
                        *guard = Some(BufWriter::new(file));
                    }
                    log_path = Some(candidate);
                }
                Err(e) => {
                    config.deferred_warnings.push(format!(
                        "Failed to open log file {}: {e}. Continuing with console logging only.",
                        candidate.display()
                    ));
                }
            }
        }
    }

    let mut builder = Builder::new();
    if cfg!(test) {
        builder.is_test(true);
    }

    if let Ok(rust_log) = env::var("RUST_LOG") {
        builder.parse_filters(&rust_log);
    } else if config.file_logging_enabled {
        builder.filter_module("ankerwerk", LevelFilter::Debug);
        builder.filter_level(LevelFilter::Warn);
    } else {
        builder.filter_level(LevelFilter::Warn);
    }

    builder.format(move |buf, record| {
        let level_str = match record.level() {
            log::Level::Error => "ERROR",
            log::Level::Warn => "WARN ",
            log::Level::Info => "INFO ",
            log::Level::Debug => "DEBUG",
            log::Level::Trace => "TRACE",
        };

        let log_line = format!(
            "[{} {} {}] {}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            level_str,
            record.target(),
            record.args()
        );

        writeln!(buf, "{log_line}")?;

        if let Ok(mut guard) = LOG_FILE_WRITER.lock() {
            if let Some(ref mut writer) = *guard {
                let _ = writeln!(writer, "{log_line}");
                let _ = writer.flush();
            }
        }

        Ok(())
    });

    builder.target(env_logger::Target::Stderr);
    builder.init();

    log::info!("Ankerwerk v{} logging started", env!("CARGO_PKG_VERSION"));
    if let Some(path) = log_path {
        log::info!("Log file: {}", path.display());
    }

    for warning in config.deferred_warnings {
        log::warn!("{warning}");
    }
}

fn resolve_logging_config() -> LoggingConfig {
    let mut deferred_warnings = Vec::new();

    let log_dir = get_log_dir();

    let retention = match env::var("ANKERWERK_LOG_RETENTION_HOURS") {
        Ok(value) => match value.parse::<u64>() {
            Ok(hours) => Duration::from_secs(hours.saturating_mul(SECONDS_PER_HOUR)),
            Err(_) => {
                deferred_warnings.push(format!(
                    "Invalid ANKERWERK_LOG_RETENTION_HOURS value '{value}'. Using default {DEFAULT_RETENTION_HOURS} hours."
                ));
                Duration::from_secs(DEFAULT_RETENTION_HOURS * SECONDS_PER_HOUR)
            }
        },
        Err(_) => Duration::from_secs(DEFAULT_RETENTION_HOURS * SECONDS_PER_HOUR),
    };

    let mut file_logging_enabled = cfg!(debug_assertions);
    if let Ok(value) = env::var("ANKERWERK_ENABLE_LOGS") {
        match parse_bool(&value) {
            Some(flag) => file_logging_enabled = flag,
            None => deferred_warnings.push(format!(
                "Invalid ANKERWERK_ENABLE_LOGS value '{value}'. Expected a boolean. Falling back to default ({file_logging_enabled})."
            )),
        }
    }

    LoggingConfig {
        file_logging_enabled,
        retention,
        log_dir,
        deferred_warnings,
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn cleanup_old_logs(log_dir: &Path, retention: Duration) -> Vec<String> {
    if retention.is_zero() {
        return Vec::new();
    }

    let mut warnings = Vec::new();
    let cutoff = match SystemTime::now().checked_sub(retention) {
        Some(cutoff) => cutoff,
        None => return warnings,
    };

    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(_) => return warnings,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|ext| ext.to_str()).unwrap_or("") != "log" {
            continue;
        }

        match entry.metadata().and_then(|meta| meta.modified()) {
            Ok(modified) if modified < cutoff => {
                if let Err(e) = fs::remove_file(&path) {
                    warnings.push(format!(
                        "Failed to delete old log file {}: {e}",
                        path.display()
                    ));
                }
            }
            Ok(_) => {}
            Err(_) => warnings.push(format!(
                "Unable to determine age for log file {}",
                path.display()
            )),
        }
    }

    warnings
}
