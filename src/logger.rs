use anyhow::{anyhow, Context, Result};
use once_cell::sync::OnceCell;
use std::fmt::Display;
use std::io::Read;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{mpsc, Arc, RwLock};
use std::thread::{self, JoinHandle};

use crate::config::{LoggerConfig, WriterSettings};
use crate::entry::LogEntry;
use crate::level::LogLevel;
use crate::queue::ActionQueue;
use crate::storage::Storage;
use crate::writer::SizeBoundedWriter;

/// Work handed to the writer thread.
#[derive(Debug)]
pub enum Action {
    Write(LogEntry),
    Configure(WriterSettings),
    /// Signalled once every action queued before it has been handled.
    Flush(mpsc::Sender<()>),
}

/// Level-gated front end. Calls build a [`LogEntry`] on the caller's thread
/// and queue it; one background thread owns the [`SizeBoundedWriter`].
///
/// Lines appear in queue order, which can differ from timestamp order when
/// two threads race between capturing the time and enqueueing.
///
/// `configure` is meant to run before logging starts. Calls racing with it
/// may see either the old or the new threshold.
pub struct Logger {
    storage: Arc<dyn Storage>,
    threshold: AtomicU32,
    file_name: RwLock<String>,
    queue: Arc<ActionQueue<Action>>,
    worker: OnceCell<Option<JoinHandle<()>>>,
}

impl Logger {
    /// An unconfigured logger: threshold `ALL`, so every call is suppressed.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            threshold: AtomicU32::new(LogLevel::ALL.ordinal()),
            file_name: RwLock::new(String::new()),
            queue: Arc::new(ActionQueue::new()),
            worker: OnceCell::new(),
        }
    }

    pub fn configure(&self, config: LoggerConfig) {
        self.threshold.store(config.level.ordinal(), Ordering::SeqCst);
        *self.file_name.write().unwrap_or_else(|e| e.into_inner()) = config.file_name.clone();
        self.enqueue(Action::Configure(config.writer_settings()));
    }

    pub fn threshold(&self) -> LogLevel {
        LogLevel(self.threshold.load(Ordering::SeqCst))
    }

    pub fn is_enabled(&self, level: LogLevel) -> bool {
        level.passes(self.threshold())
    }

    /// Informational line; `{0}`, `{1}`... in `template` are replaced by `params`.
    pub fn info(&self, template: &str, params: &[&dyn Display]) {
        if !self.is_enabled(LogLevel::INFO) {
            return;
        }
        self.enqueue(Action::Write(LogEntry::with_parameters(template, params)));
    }

    /// Error line followed by `err` and its chain of causes.
    pub fn error<E>(&self, template: &str, err: E)
    where
        E: Into<anyhow::Error>,
    {
        if !self.is_enabled(LogLevel::ERROR) {
            return;
        }
        self.enqueue(Action::Write(LogEntry::with_error(template, err.into())));
    }

    pub fn error_format(&self, template: &str, params: &[&dyn Display]) {
        if !self.is_enabled(LogLevel::ERROR) {
            return;
        }
        self.enqueue(Action::Write(LogEntry::with_parameters(template, params)));
    }

    /// Block until everything queued so far has been written (or dropped).
    pub fn flush(&self) {
        // Nothing was ever queued, or no worker could be started.
        let Some(Some(_)) = self.worker.get() else {
            return;
        };
        let (tx, rx) = mpsc::channel();
        if self.queue.enqueue(Action::Flush(tx)) {
            let _ = rx.recv();
        }
    }

    /// Whole log as text. Unlike the logging calls this reports failures,
    /// e.g. when the log has never been written.
    pub fn get_log_contents(&self) -> Result<String> {
        let name = self
            .file_name
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if name.is_empty() {
            return Err(anyhow!("no log file configured"));
        }
        let mut reader = self
            .storage
            .open_read(&name)
            .with_context(|| format!("open log {}", name))?;
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .with_context(|| format!("read log {}", name))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn enqueue(&self, action: Action) {
        let started = self.worker.get_or_init(|| self.spawn_worker()).is_some();
        if started {
            self.queue.enqueue(action);
        }
    }

    fn spawn_worker(&self) -> Option<JoinHandle<()>> {
        let queue = self.queue.clone();
        let writer = SizeBoundedWriter::new(self.storage.clone(), WriterSettings::default());
        let spawned = thread::Builder::new()
            .name("boundlog-writer".to_string())
            .spawn(move || queue.run(|action| perform(&writer, action)));
        match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!("failed to start log writer thread: {}", e);
                None
            }
        }
    }
}

fn perform(writer: &SizeBoundedWriter, action: Action) {
    match action {
        Action::Write(entry) => writer.write(&entry),
        Action::Configure(settings) => writer.configure(settings),
        Action::Flush(done) => {
            let _ = done.send(());
        }
    }
}

impl Drop for Logger {
    // Drain what is queued, then let the worker release the store.
    fn drop(&mut self) {
        self.queue.close();
        if let Some(Some(handle)) = self.worker.take() {
            let _ = handle.join();
        }
    }
}
