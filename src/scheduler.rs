//! ==============================================================================
//! scheduler.rs - ingestion loop and fixed-delay publish cadence
//! ==============================================================================
//!
//! purpose:
//!     reads lines as fast as they arrive, keeps only the newest valid reading,
//!     and once per cadence classifies and publishes that reading.
//!
//! per iteration:
//!
//! ```text
//!     ┌──────────────┐   line    ┌────────┐  Reading  ┌───────────────┐
//!     │ LineSource   │ ────────> │ parser │ ────────> │ latest slot   │
//!     │ (bounded     │           └────────┘ (reject:  │ (overwritten) │
//!     │  wait)       │                       keep old)└───────┬───────┘
//!     └──────────────┘                                        │ deadline
//!                                                             ▼
//!                                  ┌────────────┐    ┌────────────────┐
//!                                  │ publisher  │ <─ │ classifier     │
//!                                  └────────────┘    └────────────────┘
//! ```
//!
//! timing:
//!     the next deadline is set from the moment a cycle *finishes*, not from
//!     the previous deadline. a slow upload pushes later cycles back instead
//!     of causing a burst of catch-up publishes.
//!     the slot is never emptied at a cycle boundary: with no new data the
//!     previous reading is published again.
//!
//! relationships:
//!     - uses: transport.rs, parser.rs, classifier.rs, publisher.rs
//!     - writes: StatusSnapshot (read by server.rs)
//!
//! ==============================================================================

use crate::classifier::classify;
use crate::config::UplinkConfig;
use crate::domain::{unix_ms, CycleOutcome, CycleReport, Reading, StatusSnapshot};
use crate::parser::parse_line;
use crate::publisher::Publisher;
use crate::transport::LineSource;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

pub type SharedStatus = Arc<RwLock<StatusSnapshot>>;

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// gap between the end of one cycle and the next deadline
    pub cadence: Duration,
    /// longest a single transport read may block
    pub read_window: Duration,
    /// log the countdown at info (otherwise debug)
    pub show_countdown: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            cadence: Duration::from_secs(15),
            read_window: Duration::from_millis(200),
            show_countdown: true,
        }
    }
}

impl From<&UplinkConfig> for SchedulerSettings {
    fn from(config: &UplinkConfig) -> Self {
        Self {
            cadence: config.cadence(),
            read_window: config.read_window(),
            show_countdown: config.logging.show_countdown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    WaitingForData,
    CycleDue,
}

/// state owned by the loop; nothing else mutates it
#[derive(Debug)]
struct CycleState {
    latest: Option<Reading>,
    next_publish: Instant,
    last_countdown: Option<u64>,
    cycles: u64,
    lines_accepted: u64,
    lines_rejected: u64,
}

pub struct Scheduler<S, P> {
    source: S,
    publisher: P,
    settings: SchedulerSettings,
    state: CycleState,
    status: SharedStatus,
}

impl<S: LineSource, P: Publisher> Scheduler<S, P> {
    pub fn new(source: S, publisher: P, settings: SchedulerSettings, status: SharedStatus) -> Self {
        let next_publish = Instant::now() + settings.cadence;
        Self {
            source,
            publisher,
            settings,
            state: CycleState {
                latest: None,
                next_publish,
                last_countdown: None,
                cycles: 0,
                lines_accepted: 0,
                lines_rejected: 0,
            },
            status,
        }
    }

    /// newest valid reading, if any has been parsed
    pub fn latest(&self) -> Option<&Reading> {
        self.state.latest.as_ref()
    }

    pub fn next_publish(&self) -> Instant {
        self.state.next_publish
    }

    pub fn phase(&self, now: Instant) -> Phase {
        if now >= self.state.next_publish {
            Phase::CycleDue
        } else {
            Phase::WaitingForData
        }
    }

    /// Run until `shutdown` resolves. An in-flight upload is abandoned.
    pub async fn run_until<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(
            cadence_s = self.settings.cadence.as_secs_f64(),
            "ingestion loop started"
        );
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = self.step() => {}
            }
        }
        info!(cycles = self.state.cycles, "ingestion loop stopped");
    }

    /// One loop iteration: read, parse, countdown, and publish if due.
    /// Returns the cycle report when a publish boundary was crossed.
    pub async fn step(&mut self) -> Option<CycleReport> {
        self.ingest().await;

        let now = Instant::now();
        self.show_countdown(now);

        match self.phase(now) {
            Phase::WaitingForData => None,
            Phase::CycleDue => Some(self.run_cycle().await),
        }
    }

    async fn ingest(&mut self) {
        let line = match self.source.next_line(self.settings.read_window).await {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "transport read failed");
                // keep a dead device from turning the loop into a spin
                tokio::time::sleep(self.settings.read_window).await;
                return;
            }
        };

        match parse_line(&line) {
            Ok(reading) => {
                debug!(
                    temp_c = reading.temperature_c,
                    mq2 = reading.gas_level,
                    flame = reading.flame_raw,
                    "reading accepted"
                );
                self.state.latest = Some(reading);
                self.state.lines_accepted += 1;
                self.sync_status(None).await;
            }
            Err(why) => {
                debug!(%line, reason = %why, "line discarded");
                self.state.lines_rejected += 1;
            }
        }
    }

    fn show_countdown(&mut self, now: Instant) {
        if now > self.state.next_publish {
            return;
        }
        let remaining = (self.state.next_publish - now).as_secs();
        if self.state.last_countdown == Some(remaining) {
            return;
        }
        self.state.last_countdown = Some(remaining);
        if self.settings.show_countdown {
            info!("Next upload in: {}s", remaining);
        } else {
            debug!("Next upload in: {}s", remaining);
        }
    }

    async fn run_cycle(&mut self) -> CycleReport {
        self.state.cycles += 1;

        // snapshot: the slot may be overwritten while later cycles run
        let reading = self.state.latest.clone();
        let classification = reading.as_ref().map(classify);

        let outcome = match (&reading, &classification) {
            (Some(r), Some(c)) => {
                info!(
                    "[POSTING] temp={:.1}C mq2={} flame={} → alarm={} decision={} risk={:.2}",
                    r.temperature_c,
                    r.gas_level,
                    r.flame_raw,
                    u8::from(c.alarm),
                    c.decision,
                    c.risk_score
                );
                match self.publisher.publish(r, c).await {
                    Ok(ack) => {
                        if ack.is_rejected_entry() {
                            warn!(entry = %ack, "[POST OK] endpoint dropped the update");
                        } else {
                            info!(entry = %ack, "[POST OK]");
                        }
                        CycleOutcome::Published { ack: ack.0 }
                    }
                    Err(e) => {
                        error!(error = %e, "[POST FAIL]");
                        CycleOutcome::Failed { error: e.to_string() }
                    }
                }
            }
            _ => {
                info!("no reading received yet, nothing to upload");
                CycleOutcome::Skipped
            }
        };

        if let Err(e) = self.source.clear_input().await {
            debug!(error = %e, "input buffer reset failed");
        }

        self.state.next_publish = Instant::now() + self.settings.cadence;
        self.state.last_countdown = None;

        let report = CycleReport {
            cycle: self.state.cycles,
            finished_at_ms: unix_ms(),
            reading,
            classification,
            outcome,
        };
        self.sync_status(Some(&report)).await;
        report
    }

    /// Copy loop state into the shared snapshot under a single write lock.
    async fn sync_status(&self, report: Option<&CycleReport>) {
        let until_next = self.state.next_publish.saturating_duration_since(Instant::now());

        let mut status = self.status.write().await;
        status.latest = self.state.latest.clone();
        status.classification = self.state.latest.as_ref().map(classify);
        status.next_publish_at_ms = unix_ms() + until_next.as_millis() as u64;
        status.cycles = self.state.cycles;
        status.lines_accepted = self.state.lines_accepted;
        status.lines_rejected = self.state.lines_rejected;
        if let Some(report) = report {
            status.last_cycle = Some(report.clone());
        }
    }
}
