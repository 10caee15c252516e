//! Logging Infrastructure
//!
//! Structured logging for development and production:
//! - Console output, pretty or JSON
//! - Daily rotating application logs under `<log_dir>/app` (deleted after 14 days)
//! - Daily staff-action audit logs under `<log_dir>/audit` (never deleted)

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, TimeZone};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, Registry, filter::filter_fn, fmt, prelude::*};

/// Application log retention
const APP_LOG_RETENTION_DAYS: i64 = 14;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Delete `app.YYYY-MM-DD` files older than the retention window.
/// Returns the number of files removed.
pub fn cleanup_old_logs(log_dir: &Path) -> anyhow::Result<usize> {
    let cutoff = Local::now() - chrono::Duration::days(APP_LOG_RETENTION_DAYS);
    let app_log_dir = log_dir.join("app");
    if !app_log_dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in fs::read_dir(app_log_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(date_part) = name.strip_prefix("app.") else {
            continue;
        };
        let Ok(date) = chrono::NaiveDate::parse_from_str(date_part, "%Y-%m-%d") else {
            continue;
        };
        if let Some(midnight) = date.and_hms_opt(0, 0, 0)
            && let Some(local) = Local.from_local_datetime(&midnight).single()
            && local < cutoff
        {
            fs::remove_file(&path)?;
            tracing::info!(file = %name, "Deleted old log file");
            removed += 1;
        }
    }
    Ok(removed)
}

fn console_layer(json_format: bool) -> BoxedLayer {
    if json_format {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    }
}

fn file_layer(appender: RollingFileAppender, audit: bool) -> BoxedLayer {
    fmt::layer()
        .json()
        .with_target(true)
        .with_current_span(true)
        .with_thread_ids(true)
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(appender))
        .with_filter(filter_fn(move |meta| (meta.target() == "audit") == audit))
        .boxed()
}

/// Initialize the logging system
///
/// * `level` - default level when `RUST_LOG` is unset (e.g. "info")
/// * `json_format` - JSON console output (production)
/// * `log_dir` - optional directory for rotating file logs
///
/// ```no_run
/// waitlist_server::utils::logger::init_logger_with_file("debug", false, None)?;
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn init_logger_with_file(
    level: &str,
    json_format: bool,
    log_dir: Option<&Path>,
) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let mut layers: Vec<BoxedLayer> = vec![console_layer(json_format)];

    if let Some(log_dir) = log_dir {
        let app_log_dir = log_dir.join("app");
        let audit_log_dir = log_dir.join("audit");
        fs::create_dir_all(&app_log_dir)?;
        fs::create_dir_all(&audit_log_dir)?;

        layers.push(file_layer(
            RollingFileAppender::new(Rotation::DAILY, app_log_dir, "app"),
            false,
        ));
        layers.push(file_layer(
            RollingFileAppender::new(Rotation::DAILY, audit_log_dir, "audit"),
            true,
        ));

        tokio::spawn(periodic_cleanup(log_dir.to_path_buf()));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()?;
    Ok(())
}

/// Hourly application log cleanup
async fn periodic_cleanup(log_dir: PathBuf) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
    loop {
        interval.tick().await;
        if let Err(e) = cleanup_old_logs(&log_dir) {
            tracing::error!(error = %e, "Failed to cleanup old logs");
        }
    }
}

/// Console-only logging
pub fn init_logger(level: &str, json_format: bool) -> anyhow::Result<()> {
    init_logger_with_file(level, json_format, None)
}

/// Audit log helper - records staff actions on the queue
///
/// ```ignore
/// audit_log!("call_next", "restaurant:r1", "called=2");
/// ```
#[macro_export]
macro_rules! audit_log {
    ($action:expr, $resource:expr) => {
        tracing::info!(
            target: "audit",
            action = %$action,
            resource = %$resource,
            timestamp = chrono::Local::now().to_rfc3339(),
            "AUDIT"
        );
    };
    ($action:expr, $resource:expr, $details:expr) => {
        tracing::info!(
            target: "audit",
            action = %$action,
            resource = %$resource,
            details = %$details,
            timestamp = chrono::Local::now().to_rfc3339(),
            "AUDIT"
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_removes_only_expired_app_logs() {
        let dir = tempfile::tempdir().unwrap();
        let app = dir.path().join("app");
        fs::create_dir_all(&app).unwrap();

        let old = (Local::now() - chrono::Duration::days(30)).format("%Y-%m-%d");
        let fresh = Local::now().format("%Y-%m-%d");
        fs::write(app.join(format!("app.{old}")), "old").unwrap();
        fs::write(app.join(format!("app.{fresh}")), "fresh").unwrap();
        fs::write(app.join("notes.txt"), "keep").unwrap();

        assert_eq!(cleanup_old_logs(dir.path()).unwrap(), 1);
        assert!(app.join(format!("app.{fresh}")).exists());
        assert!(app.join("notes.txt").exists());
    }

    #[test]
    fn test_cleanup_without_app_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(cleanup_old_logs(dir.path()).unwrap(), 0);
    }
}
