use std::time::{Duration, Instant};

use async_trait::async_trait;
use eyre::Result;
use log::{debug, warn};

/// Number of slots in the rendered progress bar
pub const BAR_WIDTH: usize = 20;

const MB: f64 = 1024.0 * 1024.0;

/// Anything that can display a status line, typically an editable chat message
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn update(&self, text: &str) -> Result<()>;
}

/// Speed state at the time of a snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Speed {
    Starting,
    Calculating,
    BytesPerSec(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub downloaded: u64,
    pub total: u64,
    /// Always within 0.0..=100.0
    pub percent: f64,
    pub speed: Speed,
}

impl ProgressSnapshot {
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.downloaded >= self.total
    }

    pub fn bar(&self) -> String {
        render_bar(self.percent)
    }

    pub fn speed_text(&self) -> String {
        match self.speed {
            Speed::Starting => "Starting download...".to_string(),
            Speed::Calculating => "Calculating speed...".to_string(),
            Speed::BytesPerSec(bps) => format!("Speed: {:.2} KB/s", bps / 1024.0),
        }
    }

    pub fn render(&self) -> String {
        format!(
            "Downloading...\n\n{} {:.1}%\n{}\nDownloaded: {:.2} MB / {:.2} MB",
            self.bar(),
            self.percent,
            self.speed_text(),
            self.downloaded as f64 / MB,
            self.total as f64 / MB,
        )
    }
}

/// `█` for each completed slot, `-` for the rest
pub fn render_bar(percent: f64) -> String {
    let percent = if percent.is_finite() { percent.clamp(0.0, 100.0) } else { 0.0 };
    let filled = ((BAR_WIDTH as f64 * percent / 100.0).floor() as usize).min(BAR_WIDTH);
    format!("{}{}", "█".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

/// Turns `(total, remaining)` callbacks into percentages and average throughput
#[derive(Debug, Default)]
pub struct ProgressTracker {
    started: Option<Instant>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, total: u64, remaining: u64) -> ProgressSnapshot {
        self.update_at(total, remaining, Instant::now())
    }

    pub fn update_at(&mut self, total: u64, remaining: u64, now: Instant) -> ProgressSnapshot {
        let downloaded = total.saturating_sub(remaining);
        let percent = if total == 0 {
            0.0
        } else {
            (downloaded as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
        };

        let speed = match self.started {
            None => {
                self.started = Some(now);
                Speed::Starting
            }
            Some(start) => {
                let elapsed = now.saturating_duration_since(start).as_secs_f64();
                if elapsed > 0.0 {
                    Speed::BytesPerSec(downloaded as f64 / elapsed)
                } else {
                    Speed::Calculating
                }
            }
        };

        ProgressSnapshot {
            downloaded,
            total,
            percent,
            speed,
        }
    }
}

/// Pushes rendered progress to a [`StatusSink`] at most once per interval.
///
/// Sink failures (message deleted, rate limited) are logged and never stop the transfer.
pub struct ProgressReporter<S> {
    sink: S,
    tracker: ProgressTracker,
    interval: Duration,
    last_sent: Option<Instant>,
    failures: u32,
}

impl<S: StatusSink> ProgressReporter<S> {
    pub fn new(sink: S, interval: Duration) -> Self {
        Self {
            sink,
            tracker: ProgressTracker::new(),
            interval,
            last_sent: None,
            failures: 0,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Number of edits that failed so far
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub async fn report(&mut self, total: u64, remaining: u64) -> ProgressSnapshot {
        self.report_at(total, remaining, Instant::now()).await
    }

    pub async fn report_at(&mut self, total: u64, remaining: u64, now: Instant) -> ProgressSnapshot {
        let snapshot = self.tracker.update_at(total, remaining, now);

        let due = match self.last_sent {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if !due && !snapshot.is_complete() {
            return snapshot;
        }

        self.last_sent = Some(now);
        if let Err(e) = self.sink.update(&snapshot.render()).await {
            self.failures += 1;
            warn!("Error updating progress: {e}");
        } else {
            debug!("Progress {:.1}% ({}/{} bytes)", snapshot.percent, snapshot.downloaded, total);
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        updates: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl StatusSink for RecordingSink {
        async fn update(&self, text: &str) -> Result<()> {
            self.updates.lock().unwrap().push(text.to_string());
            if self.fail {
                eyre::bail!("message to edit not found");
            }
            Ok(())
        }
    }

    #[test]
    fn test_bar_rendering() {
        assert_eq!(render_bar(0.0), "-".repeat(20));
        assert_eq!(render_bar(50.0), format!("{}{}", "█".repeat(10), "-".repeat(10)));
        assert_eq!(render_bar(99.9), format!("{}-", "█".repeat(19)));
        assert_eq!(render_bar(100.0), "█".repeat(20));
        assert_eq!(render_bar(250.0), "█".repeat(20));
        assert_eq!(render_bar(f64::NAN), "-".repeat(20));
    }

    #[test]
    fn test_zero_total_does_not_divide() {
        let mut tracker = ProgressTracker::new();
        let snap = tracker.update(0, 0);
        assert_eq!(snap.percent, 0.0);
        assert!(!snap.is_complete());
        assert!(snap.render().contains("0.0%"));
    }

    #[test]
    fn test_percent_stays_in_range() {
        let mut tracker = ProgressTracker::new();
        let start = Instant::now();
        for (total, remaining) in [(100, 100), (100, 0), (100, 500), (1, 0), (u64::MAX, 1)] {
            let snap = tracker.update_at(total, remaining, start);
            assert!((0.0..=100.0).contains(&snap.percent), "{total}/{remaining} -> {}", snap.percent);
        }
    }

    #[test]
    fn test_speed_from_first_invocation() {
        let mut tracker = ProgressTracker::new();
        let start = Instant::now();

        let first = tracker.update_at(4096, 4096, start);
        assert_eq!(first.speed, Speed::Starting);
        assert_eq!(first.speed_text(), "Starting download...");

        let same_instant = tracker.update_at(4096, 3072, start);
        assert_eq!(same_instant.speed, Speed::Calculating);

        let later = tracker.update_at(4096, 2048, start + Duration::from_secs(2));
        assert_eq!(later.speed, Speed::BytesPerSec(1024.0));
        assert_eq!(later.speed_text(), "Speed: 1.00 KB/s");
        assert_eq!(later.percent, 50.0);
    }

    #[test]
    fn test_render_format() {
        let snap = ProgressSnapshot {
            downloaded: 5 * 1024 * 1024,
            total: 10 * 1024 * 1024,
            percent: 50.0,
            speed: Speed::BytesPerSec(2048.0),
        };
        assert_eq!(
            snap.render(),
            format!(
                "Downloading...\n\n{}{} 50.0%\nSpeed: 2.00 KB/s\nDownloaded: 5.00 MB / 10.00 MB",
                "█".repeat(10),
                "-".repeat(10)
            )
        );
    }

    #[tokio::test]
    async fn test_reporter_throttles_but_sends_final_frame() {
        let mut reporter = ProgressReporter::new(RecordingSink::default(), Duration::from_secs(1));
        let start = Instant::now();

        reporter.report_at(100, 100, start).await;
        reporter.report_at(100, 80, start + Duration::from_millis(200)).await;
        reporter.report_at(100, 60, start + Duration::from_millis(400)).await;
        reporter.report_at(100, 40, start + Duration::from_millis(1500)).await;
        reporter.report_at(100, 0, start + Duration::from_millis(1600)).await;

        let updates = reporter.sink().updates.lock().unwrap();
        assert_eq!(updates.len(), 3);
        assert!(updates[0].contains("0.0%"));
        assert!(updates[1].contains("60.0%"));
        assert!(updates[2].contains("100.0%"));
    }

    #[tokio::test]
    async fn test_reporter_survives_sink_failures() {
        let sink = RecordingSink {
            fail: true,
            ..Default::default()
        };
        let mut reporter = ProgressReporter::new(sink, Duration::ZERO);
        let start = Instant::now();

        for (i, remaining) in [100u64, 50, 0].into_iter().enumerate() {
            let snap = reporter
                .report_at(100, remaining, start + Duration::from_millis(i as u64 * 10))
                .await;
            assert_eq!(snap.downloaded, 100 - remaining);
        }
        assert_eq!(reporter.failures(), 3);
    }
}
