pub mod config;
pub mod entry;
pub mod global;
pub mod level;
pub mod logger;
pub mod queue;
pub mod storage;
pub mod writer;

pub use config::{LoggerConfig, WriterSettings};
pub use entry::LogEntry;
pub use global::{configure, configure_with, error, error_format, flush, get_log_contents, info};
pub use level::LogLevel;
pub use logger::{Action, Logger};
pub use queue::ActionQueue;
pub use storage::{FsStorage, MemoryStorage, Quota, Storage, StorageHandle};
pub use writer::SizeBoundedWriter;
