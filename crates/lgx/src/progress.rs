//! 📊 progress.rs — "Are we there yet?" — every export, every time, forever.
//!
//! 🚀 Messages pulled, bytes written, how fast, how far. A progress bar plus a table so comfy it
//! has lumbar support. The total comes from the cluster's own hit count, so the percentage is
//! only as honest as `track_total_hits` makes it.
//!
//! ⚠️ Watching this progress bar will not make it go faster. Science says no.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};

// -- 📏 one mebibyte — not a megabyte, pedants.
const MIB: f64 = 1024.0 * 1024.0;
const RATE_WINDOW: Duration = Duration::from_secs(5);

/// 🔢 "1000000" → "1,000,000". You're welcome, eyes.
pub(crate) fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut result = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ MM:SS, or HH:MM:SS when it is time to order pizza. Plural.
pub(crate) fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 📡 Throughput over the sliding window.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Rates {
    messages_per_sec: f64,
    mib_per_sec: f64,
}

/// 📊 Tracks one export: messages, bytes, rates, and the patience of the operator.
pub(crate) struct ProgressMetrics {
    /// 🏷️ what are we exporting? shown above the bar
    label: String,
    /// 📏 total hits reported by the cluster; 0 until the first page says otherwise
    total_hits: u64,
    messages: u64,
    bytes: u64,
    chunks: u64,
    progress_bar: ProgressBar,
    /// 🔄 (timestamp, bytes, messages), oldest first
    rate_samples: VecDeque<(Instant, u64, u64)>,
    start_time: Instant,
}

impl std::fmt::Debug for ProgressMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 ProgressBar is a diva and doesn't derive Debug
        f.debug_struct("ProgressMetrics")
            .field("label", &self.label)
            .field("total_hits", &self.total_hits)
            .field("messages", &self.messages)
            .field("bytes", &self.bytes)
            .field("chunks", &self.chunks)
            .finish()
    }
}

impl ProgressMetrics {
    /// 🚀 A bar on stderr when `visible`, a silent bookkeeper otherwise.
    pub(crate) fn new(label: String, visible: bool) -> Self {
        let progress_bar = if visible { ProgressBar::new(0) } else { ProgressBar::hidden() };
        let style = ProgressStyle::default_bar()
            .template("{msg}\n| [{bar:40.cyan/blue}]")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        progress_bar.set_style(style);

        let start_time = Instant::now();
        // -- 🔄 seed the window with t=0 so we don't divide by zero like animals
        let rate_samples = VecDeque::from([(start_time, 0u64, 0u64)]);

        Self {
            label,
            total_hits: 0,
            messages: 0,
            bytes: 0,
            chunks: 0,
            progress_bar,
            rate_samples,
            start_time,
        }
    }

    /// 📏 The cluster told us how many hits there are. Believe it, for now.
    pub(crate) fn set_total_hits(&mut self, total_hits: u64) {
        if total_hits != self.total_hits {
            self.total_hits = total_hits;
            self.progress_bar.set_length(total_hits);
        }
    }

    /// 🔄 One chunk written: `messages` messages, `bytes` bytes of NDJSON.
    pub(crate) fn record_chunk(&mut self, messages: u64, bytes: u64) {
        self.messages += messages;
        self.bytes += bytes;
        self.chunks += 1;

        let rates = self.calculate_rates(Instant::now());
        self.render(rates);
        self.progress_bar.set_position(self.messages);
    }

    pub(crate) fn messages(&self) -> u64 {
        self.messages
    }

    pub(crate) fn bytes(&self) -> u64 {
        self.bytes
    }

    pub(crate) fn chunks(&self) -> u64 {
        self.chunks
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// ✅ Ring the bell. We made it. (Or the limit did.)
    pub(crate) fn finish(&self) {
        self.progress_bar.finish();
    }

    /// 📈 Rates over the last few seconds, so one fat page doesn't look like a seismograph.
    fn calculate_rates(&mut self, now: Instant) -> Rates {
        while let Some(&(timestamp, _, _)) = self.rate_samples.front() {
            if now.duration_since(timestamp) > RATE_WINDOW {
                self.rate_samples.pop_front();
            } else {
                break;
            }
        }
        self.rate_samples.push_back((now, self.bytes, self.messages));

        let Some(&(oldest_time, oldest_bytes, oldest_messages)) = self.rate_samples.front() else {
            return Rates::default();
        };
        let elapsed = now.duration_since(oldest_time).as_secs_f64();
        if elapsed <= 0.0 {
            // -- 💤 not enough elapsed time yet — zeros, and composure
            return Rates::default();
        }
        Rates {
            messages_per_sec: self.messages.saturating_sub(oldest_messages) as f64 / elapsed,
            mib_per_sec: self.bytes.saturating_sub(oldest_bytes) as f64 / elapsed / MIB,
        }
    }

    fn percent(&self) -> f64 {
        if self.total_hits == 0 {
            return 0.0;
        }
        (self.messages as f64 / self.total_hits as f64 * 100.0).min(100.0)
    }

    /// 🎨 Two columns, right-aligned, no borders. Rendered into the bar's message.
    fn render(&self, rates: Rates) {
        let percent = self.percent();
        let elapsed = self.elapsed();
        let remaining = if percent > 0.0 && percent < 100.0 {
            // 🔮 linear extrapolation — assumes the future looks like the past
            let total_estimated = elapsed.as_secs_f64() / (percent / 100.0);
            format_duration(Duration::from_secs_f64((total_estimated - elapsed.as_secs_f64()).max(0.0)))
        } else {
            "--:--".to_string()
        };

        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.add_row(vec![
            Cell::new(format!("{} Msgs/s", format_number(rates.messages_per_sec as u64))).set_alignment(CellAlignment::Right),
            Cell::new(format!("{} / {} Msgs", format_number(self.messages), format_number(self.total_hits)))
                .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{:.2} MiB/s", rates.mib_per_sec)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2} MiB written", self.bytes as f64 / MIB)).set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} chunks", format_number(self.chunks))).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2}%", percent)).set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} elapsed", format_duration(elapsed))).set_alignment(CellAlignment::Right),
            Cell::new(format!("{} remaining", remaining)).set_alignment(CellAlignment::Right),
        ]);

        self.progress_bar
            .set_message(format!("export: {}\n{}", self.label, table));
    }
}
