//! Event file tailer
//!
//! Reads the producer's JSON Lines file strictly in order and hands each
//! decoded event to an [`EventSink`]. Incomplete trailing lines are held back
//! until their newline arrives; bytes that are not valid UTF-8 are decoded
//! lossily.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use deploywatch_api::{try_decode, DecodeError, DeployEvent, EventKind};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, info, trace};

use crate::config::WatchConfig;
use crate::error::CoreError;
use crate::tracker::Tracker;

/// Consumer of decoded events, awaited once per event
#[async_trait]
pub trait EventSink: Send {
    /// Take one event
    ///
    /// # Errors
    /// An error aborts the tailer
    async fn ingest(&mut self, event: DeployEvent) -> Result<(), CoreError>;
}

#[async_trait]
impl EventSink for Tracker {
    async fn ingest(&mut self, event: DeployEvent) -> Result<(), CoreError> {
        self.process(&event)
    }
}

/// How the tailer treats end of file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailMode {
    /// Keep polling for new lines
    Follow,
    /// Stop at end of file, decoding any unterminated last line
    Replay,
}

/// Why the tailer returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Replay reached end of file
    EndOfFile,
    /// The configured number of playbooks ended
    PlaybooksEnded,
    /// The stop flag was set
    Interrupted,
}

/// Counters for one tailer run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailStats {
    /// Non-blank lines read
    pub lines: u64,
    /// Events handed to the sink
    pub events: u64,
    /// Malformed lines skipped
    pub skipped: u64,
    /// `playbook_end` events seen
    pub playbooks_ended: usize,
    pub stopped_by: StopReason,
}

impl TailStats {
    fn new() -> Self {
        Self {
            lines: 0,
            events: 0,
            skipped: 0,
            playbooks_ended: 0,
            stopped_by: StopReason::EndOfFile,
        }
    }
}

/// Polling reader for one event file
#[derive(Debug, Clone)]
pub struct EventTailer {
    path: PathBuf,
    poll_interval: Duration,
    mode: TailMode,
    stop_after: Option<usize>,
    wait_for_file: bool,
}

impl EventTailer {
    /// Follow `path`, stopping after the first `playbook_end`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poll_interval: Duration::from_millis(50),
            mode: TailMode::Follow,
            stop_after: Some(1),
            wait_for_file: false,
        }
    }

    /// Tailer configured from the watch settings
    pub fn from_config(path: impl Into<PathBuf>, config: &WatchConfig) -> Self {
        Self::new(path)
            .with_poll_interval(config.poll_interval())
            .with_stop_after(config.stop_after())
            .with_wait_for_file(config.wait_for_file)
    }

    #[must_use]
    pub fn with_mode(mut self, mode: TailMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Stop after this many `playbook_end` events (follow mode only)
    #[must_use]
    pub fn with_stop_after(mut self, playbooks: Option<usize>) -> Self {
        self.stop_after = playbooks;
        self
    }

    /// Wait for a missing file to appear instead of failing
    #[must_use]
    pub fn with_wait_for_file(mut self, wait: bool) -> Self {
        self.wait_for_file = wait;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn mode(&self) -> TailMode {
        self.mode
    }

    /// Read events into `sink` until the run ends or `stop` is set
    ///
    /// # Errors
    /// Returns `CoreError::EventFile` if the file cannot be opened,
    /// `CoreError::StreamRead` if reading fails, or whatever the sink returns
    pub async fn run<S>(
        &self,
        sink: &mut S,
        mut stop: watch::Receiver<bool>,
    ) -> Result<TailStats, CoreError>
    where
        S: EventSink + ?Sized,
    {
        let mut stats = TailStats::new();

        let Some(file) = self.open(&mut stop).await? else {
            stats.stopped_by = StopReason::Interrupted;
            return Ok(stats);
        };
        let mut reader = BufReader::new(file);
        let mut pending: Vec<u8> = Vec::new();

        loop {
            if *stop.borrow() {
                stats.stopped_by = StopReason::Interrupted;
                break;
            }

            let read = reader
                .read_until(b'\n', &mut pending)
                .await
                .map_err(|e| CoreError::StreamRead(e.to_string()))?;

            if pending.last() == Some(&b'\n') {
                let line = std::mem::take(&mut pending);
                if self.handle_line(&line, sink, &mut stats).await? {
                    stats.stopped_by = StopReason::PlaybooksEnded;
                    break;
                }
                continue;
            }
            if read > 0 {
                // partial line, keep reading until end of file
                continue;
            }

            match self.mode {
                TailMode::Replay => {
                    if !pending.is_empty() {
                        let line = std::mem::take(&mut pending);
                        self.handle_line(&line, sink, &mut stats).await?;
                    }
                    stats.stopped_by = StopReason::EndOfFile;
                    break;
                }
                TailMode::Follow => {
                    if self.pause(&mut stop).await {
                        stats.stopped_by = StopReason::Interrupted;
                        break;
                    }
                }
            }
        }

        info!(
            path = %self.path.display(),
            events = stats.events,
            skipped = stats.skipped,
            stopped_by = ?stats.stopped_by,
            "event stream finished"
        );
        Ok(stats)
    }

    /// Decode and deliver one line; `true` when the run should end
    async fn handle_line<S>(
        &self,
        raw: &[u8],
        sink: &mut S,
        stats: &mut TailStats,
    ) -> Result<bool, CoreError>
    where
        S: EventSink + ?Sized,
    {
        let text = String::from_utf8_lossy(raw);
        let event = match try_decode(&text) {
            Ok(event) => event,
            Err(DecodeError::Blank) => return Ok(false),
            Err(err) => {
                stats.lines += 1;
                stats.skipped += 1;
                trace!(error = %err, "skipping malformed line");
                return Ok(false);
            }
        };
        stats.lines += 1;

        let ended_playbook = event.known_kind() == Some(EventKind::PlaybookEnd);
        sink.ingest(event).await?;
        stats.events += 1;

        if !ended_playbook {
            return Ok(false);
        }
        stats.playbooks_ended += 1;
        debug!(count = stats.playbooks_ended, "playbook ended");

        Ok(self.mode == TailMode::Follow
            && self
                .stop_after
                .is_some_and(|limit| stats.playbooks_ended >= limit))
    }

    /// Open the file, waiting for it when configured; `None` if interrupted
    async fn open(&self, stop: &mut watch::Receiver<bool>) -> Result<Option<File>, CoreError> {
        let mut announced = false;
        loop {
            if *stop.borrow() {
                return Ok(None);
            }

            match File::open(&self.path).await {
                Ok(file) => {
                    info!(path = %self.path.display(), mode = ?self.mode, "event file opened");
                    return Ok(Some(file));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound && self.wait_for_file => {
                    if !announced {
                        info!(path = %self.path.display(), "waiting for event file");
                        announced = true;
                    }
                    if self.pause(stop).await {
                        return Ok(None);
                    }
                }
                Err(e) => {
                    return Err(CoreError::EventFile {
                        path: self.path.display().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    /// Sleep one poll interval or until the stop flag changes
    ///
    /// Returns whether a stop was requested.
    async fn pause(&self, stop: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            () = tokio::time::sleep(self.poll_interval) => {}
            changed = stop.changed() => {
                if changed.is_err() {
                    // sender gone, nobody can stop us any more
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
        *stop.borrow()
    }
}
