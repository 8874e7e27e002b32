use anyhow::{anyhow, Context, Result};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::WriterSettings;
use crate::entry::LogEntry;
use crate::storage::{Storage, StorageHandle};

#[cfg(windows)]
pub const LINE_ENDING: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_ENDING: &str = "\n";

struct WriterState {
    settings: WriterSettings,
    handle: Option<Box<dyn StorageHandle>>,
    /// Byte length of the store as last written by us.
    length: u64,
    /// Set when an operation failed half-way; `length` is re-read before reuse.
    stale: bool,
}

/// Appends formatted entries to one named store, keeping it within
/// `min(max_log_size, quota - min_free_space)` bytes.
///
/// When an entry would overflow the budget the store is cut down to its last
/// `tail_retention` bytes (or less, so the new line fits) before appending.
/// An entry bigger than the whole budget is cut to the longest whole-character
/// prefix that fits.
pub struct SizeBoundedWriter {
    storage: Arc<dyn Storage>,
    state: Mutex<WriterState>,
}

impl SizeBoundedWriter {
    pub fn new(storage: Arc<dyn Storage>, settings: WriterSettings) -> Self {
        Self {
            storage,
            state: Mutex::new(WriterState {
                settings,
                handle: None,
                length: 0,
                stale: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WriterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the limits. Switching to another file closes the current handle;
    /// the new one is opened by the next write.
    pub fn configure(&self, settings: WriterSettings) {
        let mut state = self.lock();
        if state.settings.file_name != settings.file_name {
            state.handle = None;
            state.length = 0;
            state.stale = false;
        }
        state.settings = settings;
    }

    pub fn is_open(&self) -> bool {
        self.lock().handle.is_some()
    }

    pub fn current_length(&self) -> u64 {
        self.lock().length
    }

    /// Write one entry as a line. Failures are dropped here on purpose: a
    /// broken log must never reach the application being logged.
    pub fn write(&self, entry: &LogEntry) {
        let mut line = entry.to_text();
        line.push_str(LINE_ENDING);
        if let Err(err) = self.write_line(&line) {
            tracing::debug!("log write abandoned: {:#}", err);
        }
    }

    /// Append `line` verbatim under the size policy.
    pub fn write_line(&self, line: &str) -> Result<()> {
        let mut state = self.lock();

        if state.handle.is_none() {
            let (handle, length) = self.open(&state.settings.file_name)?;
            state.handle = Some(handle);
            state.length = length;
            state.stale = false;
        }

        let result = append_bounded(self.storage.as_ref(), &mut state, line);
        if result.is_err() {
            state.stale = true;
        }
        result
    }

    fn open(&self, file_name: &str) -> Result<(Box<dyn StorageHandle>, u64)> {
        if file_name.is_empty() {
            return Err(anyhow!("no log file configured"));
        }
        let mut handle = self
            .storage
            .open(file_name)
            .with_context(|| format!("open log store {}", file_name))?;
        let length = handle.seek(SeekFrom::End(0))?;
        Ok((handle, length))
    }
}

fn append_bounded(storage: &dyn Storage, state: &mut WriterState, line: &str) -> Result<()> {
    let WriterState {
        settings,
        handle,
        length,
        stale,
    } = state;
    let handle = handle.as_mut().context("log store not open")?;

    if *stale {
        *length = handle.len().context("resync log length")?;
        *stale = false;
    }

    let message_len = line.len() as u64;
    let quota = storage.quota().context("query storage quota")?;
    let max = effective_max(settings.max_log_size, quota, settings.min_free_space);

    if *length + message_len <= max {
        append(&mut **handle, *length, line.as_bytes())?;
        *length += message_len;
        return Ok(());
    }

    let keep = content_to_keep(settings.tail_retention, max, message_len).min(*length);
    *length = retain_tail(&mut **handle, *length, keep).context("truncate log")?;

    let text = truncate_to_char_boundary(line, max.saturating_sub(*length));
    append(&mut **handle, *length, text.as_bytes())?;
    *length += text.len() as u64;
    Ok(())
}

/// `min(max_log_size, quota - min_free_space)`, never below zero.
pub fn effective_max(max_log_size: u64, quota: u64, min_free_space: u64) -> u64 {
    max_log_size.min(quota.saturating_sub(min_free_space))
}

/// Old bytes to keep so that `message_len` still fits under `max`; zero when
/// the message alone does not fit.
pub fn content_to_keep(tail_retention: u64, max: u64, message_len: u64) -> u64 {
    tail_retention.min(max.saturating_sub(message_len))
}

/// Longest prefix of `s` made of whole characters with at most `max_bytes` UTF-8 bytes.
pub fn truncate_to_char_boundary(s: &str, max_bytes: u64) -> &str {
    if s.len() as u64 <= max_bytes {
        return s;
    }
    let mut end = 0usize;
    for c in s.chars() {
        let next = end + c.len_utf8();
        if next as u64 > max_bytes {
            break;
        }
        end = next;
    }
    &s[..end]
}

fn append(handle: &mut dyn StorageHandle, at: u64, bytes: &[u8]) -> io::Result<()> {
    handle.seek(SeekFrom::Start(at))?;
    handle.write_all(bytes)?;
    handle.flush()
}

// Rewrites the store as its last `keep` bytes, starting at a character
// boundary. Returns the new length.
fn retain_tail(handle: &mut dyn StorageHandle, length: u64, keep: u64) -> io::Result<u64> {
    let mut tail = vec![0u8; keep as usize];
    handle.seek(SeekFrom::Start(length - keep))?;
    handle.read_exact(&mut tail)?;
    let skip = tail.iter().take_while(|&&b| is_utf8_continuation(b)).count();

    handle.set_len(0)?;
    handle.seek(SeekFrom::Start(0))?;
    handle.write_all(&tail[skip..])?;
    handle.flush()?;
    Ok((tail.len() - skip) as u64)
}

fn is_utf8_continuation(b: u8) -> bool {
    b & 0b1100_0000 == 0b1000_0000
}
