use regex::Regex;
use std::sync::LazyLock;

/// `Duration: 00:05:00.00` in the stream-info header, printed once before
/// encoding starts. Absent for unseekable (piped) input.
static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Duration:\s*(\d+):(\d{2}):(\d{2})\.(\d+)").unwrap()
});

/// `time=00:01:23.45` in the recurring progress line.
static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"time=(\d+):(\d{2}):(\d{2})\.(\d+)").unwrap());

/// A completion estimate produced from one diagnostic line.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Percentage in `[0, 99]`; 100 is reserved for confirmed completion.
    pub percent: f32,
    pub elapsed: Option<String>,
    pub total: Option<String>,
}

/// Per-process parser state: the declared total media duration, learned
/// from the stream-info header. Stateless with respect to the line text
/// itself; malformed lines yield no update and never panic.
#[derive(Debug, Default)]
pub struct ParserState {
    total_secs: Option<f64>,
    total_text: Option<String>,
    /// Declared input size in bytes, for the byte-based heuristic when no
    /// duration was ever printed.
    declared_input_bytes: Option<u64>,
}

impl ParserState {
    pub fn new(declared_input_bytes: Option<u64>) -> Self {
        Self {
            declared_input_bytes,
            ..Default::default()
        }
    }

    pub fn total_duration_secs(&self) -> Option<f64> {
        self.total_secs
    }

    /// Consumes one diagnostic line. The first duration declaration sets
    /// the denominator; until it is seen, time offsets produce no
    /// fraction.
    pub fn observe_line(&mut self, line: &str) -> Option<ProgressUpdate> {
        if self.total_secs.is_none() {
            if let Some(caps) = DURATION_RE.captures(line) {
                if let Some(secs) = timestamp_secs(&caps) {
                    if secs > 0.0 {
                        self.total_secs = Some(secs);
                        self.total_text = Some(caps[0].trim_start_matches("Duration:").trim().to_string());
                    }
                }
                return None;
            }
        }

        let caps = TIME_RE.captures(line)?;
        let offset = timestamp_secs(&caps)?;
        let total = self.total_secs?;
        let fraction = (offset / total).min(1.0);
        Some(ProgressUpdate {
            percent: clamp_running((fraction * 100.0) as f32),
            elapsed: Some(caps[0].trim_start_matches("time=").to_string()),
            total: self.total_text.clone(),
        })
    }

    /// Byte-based fallback for piped input where the encoder never printed
    /// a duration. Callers feed the bytes consumed so far.
    pub fn observe_bytes(&mut self, bytes_consumed: u64) -> Option<f32> {
        if self.total_secs.is_some() {
            return None;
        }
        let total = self.declared_input_bytes?;
        if total == 0 {
            return None;
        }
        let fraction = (bytes_consumed as f64 / total as f64).min(1.0);
        Some(clamp_running((fraction * 100.0) as f32))
    }
}

/// While the process is still running the estimate is clamped to 99; 100
/// is set by the orchestrator only after a clean exit.
fn clamp_running(percent: f32) -> f32 {
    percent.clamp(0.0, 99.0)
}

fn timestamp_secs(caps: &regex::Captures<'_>) -> Option<f64> {
    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    let frac_text = &caps[4];
    let frac: f64 = frac_text.parse().ok()?;
    let frac = frac / 10f64.powi(frac_text.len() as i32);
    Some(hours * 3600.0 + minutes * 60.0 + seconds + frac)
}
