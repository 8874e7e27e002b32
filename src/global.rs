//! Process-wide logger writing into the application's per-user data directory.
//!
//! The worker thread of this logger is never stopped. Entries still queued
//! when the process exits are lost unless [`flush`] ran first.

use once_cell::sync::Lazy;
use std::fmt::Display;
use std::sync::Arc;

use crate::config::LoggerConfig;
use crate::level::LogLevel;
use crate::logger::Logger;
use crate::storage::FsStorage;

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new(Arc::new(FsStorage::for_application())));

pub fn logger() -> &'static Logger {
    &LOGGER
}

/// Configure with the default size limits. A relative `file_name` lives in
/// the application data directory; an absolute one is used as is.
pub fn configure(level: LogLevel, file_name: &str) {
    LOGGER.configure(LoggerConfig::new(level, file_name));
}

pub fn configure_with(config: LoggerConfig) {
    LOGGER.configure(config);
}

pub fn info(template: &str, params: &[&dyn Display]) {
    LOGGER.info(template, params);
}

pub fn error<E>(template: &str, err: E)
where
    E: Into<anyhow::Error>,
{
    LOGGER.error(template, err);
}

pub fn error_format(template: &str, params: &[&dyn Display]) {
    LOGGER.error_format(template, params);
}

pub fn flush() {
    LOGGER.flush();
}

pub fn get_log_contents() -> anyhow::Result<String> {
    LOGGER.get_log_contents()
}
