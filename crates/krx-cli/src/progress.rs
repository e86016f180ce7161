//! 📊 Import progress: a bar for the bytes, a small table for the numbers.
//!
//! Rates use a sliding 5-second window so one slow bulk call doesn't make the
//! docs/s figure swing all over the place.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};

const MIB: f64 = 1024.0 * 1024.0;
const WINDOW: Duration = Duration::from_secs(5);

/// 🔢 `1234567` -> `1,234,567`.
pub(crate) fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// ⏱️ MM:SS, or HH:MM:SS once it gets long.
pub(crate) fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 📊 Tracks one import into one index.
pub(crate) struct ImportProgress {
    index: String,
    total_bytes: u64,
    bytes: u64,
    docs: u64,
    flushes: usize,
    bar: ProgressBar,
    samples: VecDeque<(Instant, u64)>,
    started: Instant,
}

impl std::fmt::Debug for ImportProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- ProgressBar has no Debug
        f.debug_struct("ImportProgress")
            .field("index", &self.index)
            .field("total_bytes", &self.total_bytes)
            .field("bytes", &self.bytes)
            .field("docs", &self.docs)
            .field("flushes", &self.flushes)
            .finish()
    }
}

impl ImportProgress {
    pub(crate) fn new(index: impl Into<String>, total_bytes: u64) -> Self {
        let bar = ProgressBar::new(total_bytes);
        let style = ProgressStyle::default_bar()
            .template("{msg}\n| [{bar:40.cyan/blue}]")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        bar.set_style(style);
        let started = Instant::now();
        Self {
            index: index.into(),
            total_bytes,
            bytes: 0,
            docs: 0,
            flushes: 0,
            bar,
            samples: VecDeque::from([(started, 0)]),
            started,
        }
    }

    /// 🔄 One more line consumed. `flushes` is the bulk scope's running count.
    pub(crate) fn update(&mut self, bytes: u64, docs: u64, flushes: usize) {
        self.bytes += bytes;
        self.docs += docs;
        self.flushes = flushes;
        let docs_per_sec = self.docs_per_sec();
        self.bar.set_message(self.render(docs_per_sec));
        self.bar.set_position(self.bytes);
    }

    pub(crate) fn docs(&self) -> u64 {
        self.docs
    }

    /// ✅ Stop the bar and leave a one-line summary behind.
    pub(crate) fn finish(&self, flushes: usize) {
        self.bar.finish_with_message(format!(
            "index: {}\n{} docs in {} bulk calls, {} elapsed",
            self.index,
            format_number(self.docs),
            flushes,
            format_duration(self.started.elapsed())
        ));
    }

    fn docs_per_sec(&mut self) -> f64 {
        let now = Instant::now();
        while let Some(&(at, _)) = self.samples.front() {
            if now.duration_since(at) > WINDOW {
                self.samples.pop_front();
            } else {
                break;
            }
        }
        self.samples.push_back((now, self.docs));

        match self.samples.front() {
            Some(&(oldest, docs_then)) => {
                let elapsed = now.duration_since(oldest).as_secs_f64();
                if elapsed > 0.0 {
                    self.docs.saturating_sub(docs_then) as f64 / elapsed
                } else {
                    0.0
                }
            }
            None => 0.0,
        }
    }

    fn render(&self, docs_per_sec: f64) -> String {
        let percent = if self.total_bytes > 0 {
            self.bytes as f64 / self.total_bytes as f64 * 100.0
        } else {
            0.0
        };

        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        let right = |text: String| Cell::new(text).set_alignment(CellAlignment::Right);
        table.add_row(vec![
            right(format!("{} Docs/s", format_number(docs_per_sec as u64))),
            right(format!("{} Docs", format_number(self.docs))),
        ]);
        table.add_row(vec![
            right(format!(
                "{:.2} / {:.2} MiB",
                self.bytes as f64 / MIB,
                self.total_bytes as f64 / MIB
            )),
            right(format!("{:.2}%", percent)),
        ]);
        table.add_row(vec![
            right(format!("{} elapsed", format_duration(self.started.elapsed()))),
            right(format!("{} bulk calls", self.flushes)),
        ]);
        format!("index: {}\n{}", self.index, table)
    }
}
