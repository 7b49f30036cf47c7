use std::collections::HashMap;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::parser::{LineRejection, LogParser};
use crate::store::{PlayerStore, UpsertOutcome};
use crate::tail::LogTail;
use crate::watcher::DirtySignal;

/// Timing knobs for the ingestion loop
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngestConfig {
    /// How often the dirty signal is checked
    pub poll_interval: Duration,

    /// Read even without a signal every N ticks (covers lost notifications)
    pub fallback_poll_ticks: Option<u32>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            fallback_poll_ticks: None,
        }
    }
}

/// Where the loop currently is
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum IngestState {
    #[default]
    Idle,
    Reading,
    Applying,
}

/// Outcome of one read-parse-apply batch
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Complete lines read from the file
    pub lines: usize,

    /// New players
    pub inserted: usize,

    /// Existing players refreshed
    pub updated: usize,

    /// Lines skipped, by reason
    pub rejected: HashMap<LineRejection, usize>,

    /// The read failed and will be retried
    pub read_failed: bool,

    /// File offset after the batch
    pub cursor: u64,
}

impl BatchReport {
    /// Sightings written to the store
    pub fn applied(&self) -> usize {
        self.inserted + self.updated
    }

    pub fn rejected_count(&self, reason: LineRejection) -> usize {
        self.rejected.get(&reason).copied().unwrap_or(0)
    }
}

/// Moves newly appended log lines into the player store.
///
/// Each tick checks the [`DirtySignal`]; when it is set the loop reads the new
/// lines, parses them against one shared reference time and upserts every
/// sighting before going idle again.
pub struct IngestLoop {
    tail: LogTail,
    parser: LogParser,
    store: PlayerStore,
    signal: DirtySignal,
    config: IngestConfig,
    state: IngestState,

    /// Ticks since the last read, for the fallback poll
    ticks_since_read: u32,

    /// Consecutive failed reads (only the first one is logged at warn)
    read_failures: u32,

    report_tx: Option<mpsc::UnboundedSender<BatchReport>>,
}

impl IngestLoop {
    pub fn new(
        tail: LogTail,
        parser: LogParser,
        store: PlayerStore,
        signal: DirtySignal,
        config: IngestConfig,
    ) -> Self {
        Self {
            tail,
            parser,
            store,
            signal,
            config,
            state: IngestState::Idle,
            ticks_since_read: 0,
            read_failures: 0,
            report_tx: None,
        }
    }

    /// Send every batch report to `report_tx`
    pub fn with_reports(mut self, report_tx: mpsc::UnboundedSender<BatchReport>) -> Self {
        self.report_tx = Some(report_tx);
        self
    }

    pub fn state(&self) -> IngestState {
        self.state
    }

    pub fn tail(&self) -> &LogTail {
        &self.tail
    }

    pub fn store(&self) -> &PlayerStore {
        &self.store
    }

    /// Run until `cancel` fires.
    ///
    /// Cancellation is only observed between batches, so a batch in progress
    /// always finishes.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            log_path = %self.tail.path().display(),
            cursor = self.tail.cursor(),
            poll_ms = self.config.poll_interval.as_millis() as u64,
            "Ingestion loop started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                _ = ticker.tick() => {
                    let now = Local::now().naive_local();
                    if let Some(report) = self.tick(now) {
                        self.publish(report);
                    }
                }
            }
        }

        tracing::info!(cursor = self.tail.cursor(), "Ingestion loop stopped");
    }

    /// One timer tick: run a batch if the file changed (or the fallback poll
    /// is due)
    pub fn tick(&mut self, now: NaiveDateTime) -> Option<BatchReport> {
        self.ticks_since_read = self.ticks_since_read.saturating_add(1);

        let signalled = self.signal.take();
        let fallback_due = self
            .config
            .fallback_poll_ticks
            .is_some_and(|every| every > 0 && self.ticks_since_read >= every);

        if !signalled && !fallback_due {
            return None;
        }

        Some(self.run_batch(now))
    }

    /// Read, parse and apply everything appended since the last batch.
    ///
    /// `now` is both the staleness reference for every line and the update
    /// time written to the store.
    pub fn run_batch(&mut self, now: NaiveDateTime) -> BatchReport {
        let mut report = BatchReport::default();
        self.ticks_since_read = 0;

        self.transition(IngestState::Reading);
        let lines = match self.tail.read_lines() {
            Ok(lines) => {
                if self.read_failures > 0 {
                    tracing::info!(
                        failed_reads = self.read_failures,
                        "Log file readable again"
                    );
                }
                self.read_failures = 0;
                lines
            }
            Err(error) => {
                if self.read_failures == 0 {
                    tracing::warn!(%error, "Failed to read log update, will retry");
                } else {
                    tracing::debug!(%error, "Log read still failing");
                }
                self.read_failures = self.read_failures.saturating_add(1);

                // Retry on the next tick rather than waiting for another change
                self.signal.mark();
                report.read_failed = true;
                report.cursor = self.tail.cursor();
                self.transition(IngestState::Idle);
                return report;
            }
        };

        self.transition(IngestState::Applying);
        report.lines = lines.len();

        for line in &lines {
            match self.parser.classify(line, now) {
                Ok(sighting) => match self.store.upsert(&sighting, now) {
                    UpsertOutcome::Inserted => {
                        tracing::debug!(
                            player = %sighting.name,
                            level = ?sighting.level,
                            "New player"
                        );
                        report.inserted += 1;
                    }
                    UpsertOutcome::Updated => report.updated += 1,
                },
                Err(reason) => {
                    tracing::trace!(reason = reason.as_str(), line = %line, "Skipped log line");
                    *report.rejected.entry(reason).or_insert(0) += 1;
                }
            }
        }

        report.cursor = self.tail.cursor();
        self.transition(IngestState::Idle);

        if report.lines > 0 {
            tracing::debug!(
                lines = report.lines,
                inserted = report.inserted,
                updated = report.updated,
                cursor = report.cursor,
                "Applied log batch"
            );
        }

        report
    }

    fn transition(&mut self, next: IngestState) {
        tracing::trace!(from = ?self.state, to = ?next, "Ingestion state");
        self.state = next;
    }

    fn publish(&mut self, report: BatchReport) {
        let Some(report_tx) = &self.report_tx else {
            return;
        };
        if report_tx.send(report).is_err() {
            tracing::debug!("Batch report receiver dropped");
            self.report_tx = None;
        }
    }
}

impl std::fmt::Debug for IngestLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestLoop")
            .field("tail", &self.tail)
            .field("state", &self.state)
            .field("config", &self.config)
            .finish()
    }
}
