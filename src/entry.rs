use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};
use std::cell::Cell;
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};

/// Timestamp layout of a persisted line (millisecond precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: Cell<u64> = const { Cell::new(0) };
}

/// Small process-unique id of the calling thread, assigned on first use.
pub fn current_thread_id() -> u64 {
    THREAD_ID.with(|id| {
        if id.get() == 0 {
            id.set(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed));
        }
        id.get()
    })
}

/// One log event, captured on the calling thread and formatted later by the writer.
#[derive(Debug)]
pub struct LogEntry {
    when: DateTime<Local>,
    thread_id: u64,
    message: String,
    parameters: Vec<String>,
    error: Option<anyhow::Error>,
}

impl LogEntry {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            when: Local::now(),
            thread_id: current_thread_id(),
            message: message.into(),
            parameters: Vec::new(),
            error: None,
        }
    }

    /// Parameters are rendered with `Display` right away so the entry owns everything it needs.
    pub fn with_parameters(message: impl Into<String>, parameters: &[&dyn Display]) -> Self {
        let mut entry = Self::new(message);
        entry.parameters = parameters.iter().map(|p| p.to_string()).collect();
        entry
    }

    pub fn with_error(message: impl Into<String>, error: anyhow::Error) -> Self {
        let mut entry = Self::new(message);
        entry.error = Some(error);
        entry
    }

    pub fn when(&self) -> DateTime<Local> {
        self.when
    }

    pub fn thread_id(&self) -> u64 {
        self.thread_id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn error(&self) -> Option<&anyhow::Error> {
        self.error.as_ref()
    }

    /// Message text after attaching the error or substituting parameters.
    ///
    /// An attached error wins over parameters. A template that fails to format
    /// is returned verbatim.
    pub fn resolved_message(&self) -> String {
        if let Some(err) = &self.error {
            format!("{}\n{}", self.message, describe_error(err))
        } else if !self.parameters.is_empty() {
            format_positional(&self.message, &self.parameters)
                .unwrap_or_else(|_| self.message.clone())
        } else {
            self.message.clone()
        }
    }

    /// `yyyy-MM-dd HH:mm:ss.fff [NNN] message`, without a line terminator.
    pub fn to_text(&self) -> String {
        format!(
            "{} [{:03}] {}",
            self.when.format(TIMESTAMP_FORMAT),
            self.thread_id,
            self.resolved_message()
        )
    }

    #[cfg(test)]
    pub(crate) fn at(mut self, when: DateTime<Local>, thread_id: u64) -> Self {
        self.when = when;
        self.thread_id = thread_id;
        self
    }
}

/// Top-level message followed by one `Caused by:` line per nested cause.
pub fn describe_error(err: &anyhow::Error) -> String {
    let mut out = err.to_string();
    for cause in err.chain().skip(1) {
        out.push_str("\nCaused by: ");
        out.push_str(&cause.to_string());
    }
    out
}

/// Substitute `{index[,alignment][:format]}` placeholders with `params`.
///
/// `{{` and `}}` are literal braces. The format component is accepted but not
/// interpreted; parameters are already rendered text.
pub fn format_positional(template: &str, params: &[String]) -> Result<String> {
    let mut out = String::with_capacity(template.len() + 16 * params.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let mut placeholder = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    if c == '{' {
                        return Err(anyhow!("nested '{{' in placeholder"));
                    }
                    placeholder.push(c);
                }
                if !closed {
                    return Err(anyhow!("unterminated placeholder"));
                }
                push_placeholder(&mut out, &placeholder, params)?;
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                    out.push('}');
                } else {
                    return Err(anyhow!("unmatched '}}'"));
                }
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}

fn push_placeholder(out: &mut String, placeholder: &str, params: &[String]) -> Result<()> {
    let head = placeholder.split_once(':').map_or(placeholder, |(head, _format)| head);
    let (index, alignment) = match head.split_once(',') {
        Some((index, alignment)) => (index, Some(alignment)),
        None => (head, None),
    };

    let index = index.trim();
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return Err(anyhow!("bad placeholder index: {:?}", index));
    }
    let index: usize = index.parse()?;
    let value = params
        .get(index)
        .ok_or_else(|| anyhow!("placeholder {} but only {} parameters", index, params.len()))?;

    let width: i64 = match alignment {
        Some(a) => a
            .trim()
            .parse()
            .map_err(|_| anyhow!("bad placeholder alignment: {:?}", a))?,
        None => 0,
    };
    let pad = (width.unsigned_abs() as usize).saturating_sub(value.chars().count());
    if width > 0 {
        out.extend(std::iter::repeat(' ').take(pad));
        out.push_str(value);
    } else {
        out.push_str(value);
        out.extend(std::iter::repeat(' ').take(pad));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 3, 9, 14, 5, 7)
            .unwrap()
            .checked_add_signed(chrono::Duration::milliseconds(42))
            .unwrap()
    }

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn plain_entry_layout() {
        let entry = LogEntry::new("started").at(fixed_time(), 7);
        assert_eq!(entry.to_text(), "2024-03-09 14:05:07.042 [007] started");
    }

    #[test]
    fn thread_id_wider_than_three_digits_is_kept() {
        let entry = LogEntry::new("x").at(fixed_time(), 12345);
        assert_eq!(entry.to_text(), "2024-03-09 14:05:07.042 [12345] x");
    }

    #[test]
    fn parameters_are_substituted() {
        let n = 42;
        let entry = LogEntry::with_parameters("value={0} name={1}", &[&n, &"abc"]);
        assert_eq!(entry.resolved_message(), "value=42 name=abc");
    }

    #[test]
    fn error_takes_precedence_over_parameters() {
        let err = anyhow!("disk gone").context("flush failed");
        let mut entry = LogEntry::with_error("Error happened", err);
        entry.parameters = strings(&["ignored"]);
        assert_eq!(
            entry.resolved_message(),
            "Error happened\nflush failed\nCaused by: disk gone"
        );
    }

    #[test]
    fn bad_template_falls_back_to_raw_text() {
        let entry = LogEntry::with_parameters("only {0} and {1}", &[&1]);
        assert_eq!(entry.resolved_message(), "only {0} and {1}");

        let entry = LogEntry::with_parameters("broken {0", &[&1]);
        assert_eq!(entry.resolved_message(), "broken {0");
    }

    #[test]
    fn escapes_alignment_and_format_component() {
        let params = strings(&["7", "ab"]);
        assert_eq!(
            format_positional("{{{0}}} [{1,4}] [{1,-4}] {0:D3}", &params).unwrap(),
            "{7} [  ab] [ab  ] 7"
        );
    }

    #[test]
    fn rejects_malformed_placeholders() {
        let params = strings(&["a"]);
        assert!(format_positional("{x}", &params).is_err());
        assert!(format_positional("{}", &params).is_err());
        assert!(format_positional("a } b", &params).is_err());
        assert!(format_positional("{0,z}", &params).is_err());
    }

    #[test]
    fn thread_ids_are_stable_per_thread_and_distinct_across_threads() {
        let here = current_thread_id();
        assert_eq!(here, current_thread_id());
        let other = std::thread::spawn(current_thread_id).join().unwrap();
        assert_ne!(here, other);
    }
}
