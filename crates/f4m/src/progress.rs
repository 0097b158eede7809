use std::time::{Duration, Instant};

use crate::fragment::FragmentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Downloading,
    Finished,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    Started {
        fragments: usize,
    },
    /// Byte progress of a single fetch, as reported by the fetcher.
    Fetching {
        fragment: FragmentId,
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
        status: FetchStatus,
    },
    FragmentCompleted {
        fragment: FragmentId,
        progress: DownloadProgress,
    },
    Completed {
        total_bytes: u64,
        elapsed: Duration,
    },
}

/// Snapshot of a download session after a fragment has been appended.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    pub completed_fragments: usize,
    pub total_fragments: usize,
    pub downloaded_bytes: u64,
    /// Size of the first fragment times the fragment count.
    pub estimated_total_bytes: Option<u64>,
    pub elapsed: Duration,
    /// Bytes per second.
    pub speed: f64,
    pub eta: Option<Duration>,
}

impl DownloadProgress {
    pub fn percentage(&self) -> f64 {
        if self.total_fragments == 0 {
            0.
        } else {
            self.completed_fragments as f64 / self.total_fragments as f64 * 100.
        }
    }
}

/// Receives events emitted while downloading.
pub trait DownloadObserver: Send + Sync {
    fn on_event(&self, event: DownloadEvent);
}

impl<F> DownloadObserver for F
where
    F: Fn(DownloadEvent) + Send + Sync,
{
    fn on_event(&self, event: DownloadEvent) {
        self(event)
    }
}

/// Writes progress to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl DownloadObserver for LogObserver {
    fn on_event(&self, event: DownloadEvent) {
        match event {
            DownloadEvent::Started { fragments } => {
                tracing::info!("Downloading {fragments} fragment(s).");
            }
            DownloadEvent::Fetching {
                fragment,
                downloaded_bytes,
                total_bytes,
                status,
            } => {
                tracing::trace!(
                    "{fragment}: {downloaded_bytes} / {} bytes ({status:?})",
                    total_bytes.map_or_else(|| "?".to_string(), |t| t.to_string())
                );
            }
            DownloadEvent::FragmentCompleted { fragment, progress } => {
                let eta = progress
                    .eta
                    .map_or_else(|| "--".to_string(), format_duration);
                tracing::info!(
                    "Processing {fragment} finished. ({} / {} or {:.2}%) | Avg Speed: {}/s | ETA: {eta}",
                    progress.completed_fragments,
                    progress.total_fragments,
                    progress.percentage(),
                    format_bytes(progress.speed as u64),
                );
            }
            DownloadEvent::Completed {
                total_bytes,
                elapsed,
            } => {
                tracing::info!(
                    "Downloaded {} in {}.",
                    format_bytes(total_bytes),
                    format_duration(elapsed)
                );
            }
        }
    }
}

/// Counters of one download session.
#[derive(Debug)]
pub struct DownloadSession {
    started_at: Instant,
    total_fragments: usize,
    completed_fragments: usize,
    downloaded_bytes: u64,
    first_fragment_bytes: Option<u64>,
}

impl DownloadSession {
    pub fn new(total_fragments: usize) -> Self {
        Self {
            started_at: Instant::now(),
            total_fragments,
            completed_fragments: 0,
            downloaded_bytes: 0,
            first_fragment_bytes: None,
        }
    }

    pub fn record_fragment(&mut self, bytes: u64) {
        self.completed_fragments += 1;
        self.downloaded_bytes += bytes;
        self.first_fragment_bytes.get_or_insert(bytes);
    }

    pub fn downloaded_bytes(&self) -> u64 {
        self.downloaded_bytes
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn progress(&self) -> DownloadProgress {
        self.progress_at(self.elapsed())
    }

    /// Computes the progress as if `elapsed` time had passed since the session started.
    pub fn progress_at(&self, elapsed: Duration) -> DownloadProgress {
        let estimated_total_bytes = self
            .first_fragment_bytes
            .map(|first| first * self.total_fragments as u64);

        let seconds = elapsed.as_secs_f64();
        let speed = if seconds > 0. {
            self.downloaded_bytes as f64 / seconds
        } else {
            0.
        };

        let eta = match estimated_total_bytes {
            Some(total) if speed > 0. => {
                let remaining = total.saturating_sub(self.downloaded_bytes);
                Some(Duration::from_secs_f64(remaining as f64 / speed))
            }
            _ => None,
        };

        DownloadProgress {
            completed_fragments: self.completed_fragments,
            total_fragments: self.total_fragments,
            downloaded_bytes: self.downloaded_bytes,
            estimated_total_bytes,
            elapsed,
            speed,
            eta,
        }
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];

    if bytes < 1024 {
        return format!("{bytes}B");
    }
    let mut value = bytes as f64;
    let mut unit = "B";
    for next in UNITS {
        if value < 1024. {
            break;
        }
        value /= 1024.;
        unit = next;
    }
    format!("{value:.2}{unit}")
}

fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();
    let (hours, minutes, seconds) = (seconds / 3600, seconds / 60 % 60, seconds % 60);
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
