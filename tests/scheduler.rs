//! Cadence and latest-reading behaviour of the ingestion loop, on paused time.

use async_trait::async_trait;
use sensor_uplink::domain::{CycleOutcome, StatusSnapshot};
use sensor_uplink::publisher::{Ack, PublishError, Publisher};
use sensor_uplink::scheduler::{Phase, Scheduler, SchedulerSettings, SharedStatus};
use sensor_uplink::transport::LineSource;
use sensor_uplink::{Classification, Decision, Reading, Reason};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

const CADENCE: Duration = Duration::from_secs(15);
const WINDOW: Duration = Duration::from_millis(200);

// ── test doubles ──────────────────────────────────────────────

enum Step {
    Line(&'static str),
    Fail,
}

/// Hands out scripted lines, one per read; waits out the window when empty.
#[derive(Default)]
struct ScriptedSource {
    script: VecDeque<Step>,
    clears: Arc<Mutex<u32>>,
    fail_clear: bool,
}

impl ScriptedSource {
    fn lines(lines: &[&'static str]) -> Self {
        Self {
            script: lines.iter().copied().map(Step::Line).collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl LineSource for ScriptedSource {
    async fn next_line(&mut self, wait: Duration) -> anyhow::Result<Option<String>> {
        match self.script.pop_front() {
            Some(Step::Line(line)) => Ok(Some(line.to_string())),
            Some(Step::Fail) => Err(anyhow::anyhow!("device unplugged")),
            None => {
                tokio::time::sleep(wait).await;
                Ok(None)
            }
        }
    }

    async fn clear_input(&mut self) -> anyhow::Result<()> {
        *self.clears.lock().unwrap() += 1;
        if self.fail_clear {
            anyhow::bail!("reset not supported");
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct Call {
    at: Instant,
    reading: Reading,
    classification: Classification,
}

/// Records every publish; optionally stalls and fails the first attempt.
#[derive(Clone, Default)]
struct RecordingPublisher {
    calls: Arc<Mutex<Vec<Call>>>,
    stall_first: Option<Duration>,
}

impl RecordingPublisher {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(
        &self,
        reading: &Reading,
        classification: &Classification,
    ) -> Result<Ack, PublishError> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call {
                at: Instant::now(),
                reading: reading.clone(),
                classification: *classification,
            });
            calls.len()
        };
        if n == 1 {
            if let Some(stall) = self.stall_first {
                tokio::time::sleep(stall).await;
                return Err(PublishError::Timeout(stall));
            }
        }
        Ok(Ack(n.to_string()))
    }
}

fn settings() -> SchedulerSettings {
    SchedulerSettings { cadence: CADENCE, read_window: WINDOW, show_countdown: false }
}

fn status() -> SharedStatus {
    Arc::new(RwLock::new(StatusSnapshot::default()))
}

/// Step until `n` cycles have run, collecting their outcomes.
async fn run_cycles<S: LineSource, P: Publisher>(
    scheduler: &mut Scheduler<S, P>,
    n: usize,
) -> Vec<CycleOutcome> {
    let mut outcomes = Vec::new();
    while outcomes.len() < n {
        if let Some(report) = scheduler.step().await {
            outcomes.push(report.outcome);
        }
    }
    outcomes
}

// ── tests ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn first_cycle_fires_after_one_cadence() {
    let start = Instant::now();
    let publisher = RecordingPublisher::default();
    let mut scheduler = Scheduler::new(
        ScriptedSource::lines(&["A1,ms=1000,tempC=24.5,mq2=100,flame=0,gas=clean,light=200"]),
        publisher.clone(),
        settings(),
        status(),
    );
    assert_eq!(scheduler.phase(start), Phase::WaitingForData);

    let outcomes = run_cycles(&mut scheduler, 1).await;
    assert_eq!(outcomes, vec![CycleOutcome::Published { ack: "1".into() }]);

    let calls = publisher.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].at - start >= CADENCE);
    assert!(calls[0].at - start < CADENCE + WINDOW * 2);

    let c = calls[0].classification;
    assert_eq!(calls[0].reading.temperature_c, 24.5);
    assert_eq!(c.decision, Decision::Normal);
    assert_eq!(c.reason, Reason::Normal);
    assert_eq!(c.risk_score, 0.05);
    assert!(!c.alarm);
}

#[tokio::test(start_paused = true)]
async fn newest_reading_wins() {
    let publisher = RecordingPublisher::default();
    let mut scheduler = Scheduler::new(
        ScriptedSource::lines(&[
            "A1,tempC=20.0,mq2=100,flame=0",
            "A1,tempC=21.0,mq2=300,flame=0",
            "A1,tempC=30.0,mq2=500,flame=0",
        ]),
        publisher.clone(),
        settings(),
        status(),
    );

    run_cycles(&mut scheduler, 1).await;

    let calls = publisher.calls();
    assert_eq!(calls[0].reading.temperature_c, 30.0);
    assert_eq!(calls[0].classification.decision, Decision::HighRisk);
    assert_eq!(calls[0].classification.reason, Reason::Mq2Danger);
    assert_eq!(calls[0].classification.risk_score, 0.9);
    assert!(calls[0].classification.alarm);
}

#[tokio::test(start_paused = true)]
async fn rejected_lines_keep_previous_reading() {
    let publisher = RecordingPublisher::default();
    let mut scheduler = Scheduler::new(
        ScriptedSource::lines(&[
            "A1,tempC=22.0,mq2=260,flame=0",
            "A1,tempC=hot,mq2=900,flame=1",
            "",
            "A1,mq2=900",
            "noise without fields",
        ]),
        publisher.clone(),
        settings(),
        status(),
    );

    run_cycles(&mut scheduler, 1).await;

    let calls = publisher.calls();
    assert_eq!(calls[0].reading.gas_level, 260);
    assert_eq!(calls[0].classification.decision, Decision::Warning);
}

#[tokio::test(start_paused = true)]
async fn stale_reading_is_republished() {
    let publisher = RecordingPublisher::default();
    let mut scheduler = Scheduler::new(
        ScriptedSource::lines(&["A1,tempC=22.0,mq2=120,flame=0"]),
        publisher.clone(),
        settings(),
        status(),
    );

    let outcomes = run_cycles(&mut scheduler, 3).await;
    assert!(outcomes.iter().all(|o| matches!(o, CycleOutcome::Published { .. })));

    let calls = publisher.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|c| c.reading == calls[0].reading));
}

#[tokio::test(start_paused = true)]
async fn no_reading_skips_but_still_reschedules() {
    let start = Instant::now();
    let publisher = RecordingPublisher::default();
    let mut scheduler = Scheduler::new(ScriptedSource::default(), publisher.clone(), settings(), status());

    let outcomes = run_cycles(&mut scheduler, 2).await;
    assert_eq!(outcomes, vec![CycleOutcome::Skipped, CycleOutcome::Skipped]);
    assert!(publisher.calls().is_empty());
    assert!(scheduler.latest().is_none());
    assert!(scheduler.next_publish() - start >= CADENCE * 3);
}

#[tokio::test(start_paused = true)]
async fn timed_out_publish_does_not_stop_the_next_cycle() {
    let start = Instant::now();
    let stall = Duration::from_secs(10);
    let publisher = RecordingPublisher { stall_first: Some(stall), ..Default::default() };
    let mut scheduler = Scheduler::new(
        ScriptedSource::lines(&["A1,tempC=22.0,mq2=120,flame=0"]),
        publisher.clone(),
        settings(),
        status(),
    );

    let outcomes = run_cycles(&mut scheduler, 2).await;
    assert!(matches!(outcomes[0], CycleOutcome::Failed { ref error } if error.contains("timed out")));
    assert!(matches!(outcomes[1], CycleOutcome::Published { .. }));

    let calls = publisher.calls();
    assert_eq!(calls.len(), 2);
    // fixed delay: the next deadline counts from the end of the stalled cycle
    let first_end = calls[0].at + stall;
    let gap = calls[1].at - first_end;
    assert!(gap >= CADENCE, "second attempt came {gap:?} after the first ended");
    assert!(gap < CADENCE + WINDOW * 2);
    assert!(calls[1].at - start >= CADENCE * 2 + stall);
}

#[tokio::test(start_paused = true)]
async fn at_most_one_publish_per_cadence() {
    let start = Instant::now();
    let publisher = RecordingPublisher::default();
    let mut scheduler = Scheduler::new(
        ScriptedSource::lines(&["A1,tempC=22.0,mq2=120,flame=0"]),
        publisher.clone(),
        settings(),
        status(),
    );

    while Instant::now() - start < Duration::from_secs(100) {
        scheduler.step().await;
    }

    let calls = publisher.calls();
    assert_eq!(calls.len(), 6);
    for pair in calls.windows(2) {
        assert!(pair[1].at - pair[0].at >= CADENCE);
    }
}

#[tokio::test(start_paused = true)]
async fn transport_and_reset_failures_are_not_fatal() {
    let clears = Arc::new(Mutex::new(0));
    let source = ScriptedSource {
        script: VecDeque::from([Step::Fail, Step::Line("A1,tempC=22.0,mq2=120,flame=1"), Step::Fail]),
        clears: clears.clone(),
        fail_clear: true,
    };
    let publisher = RecordingPublisher::default();
    let mut scheduler = Scheduler::new(source, publisher.clone(), settings(), status());

    let outcomes = run_cycles(&mut scheduler, 2).await;
    assert_eq!(outcomes.len(), 2);
    assert_eq!(*clears.lock().unwrap(), 2);
    assert_eq!(publisher.calls()[0].classification.reason, Reason::Flame);
}

#[tokio::test(start_paused = true)]
async fn status_snapshot_tracks_the_loop() {
    let shared = status();
    let publisher = RecordingPublisher::default();
    let mut scheduler = Scheduler::new(
        ScriptedSource::lines(&["A1,tempC=22.0,mq2=260,flame=0", "bogus"]),
        publisher,
        settings(),
        shared.clone(),
    );

    run_cycles(&mut scheduler, 1).await;

    let snap = shared.read().await.clone();
    assert_eq!(snap.cycles, 1);
    assert_eq!(snap.lines_accepted, 1);
    assert_eq!(snap.lines_rejected, 1);
    assert_eq!(snap.latest.as_ref().map(|r| r.gas_level), Some(260));
    assert_eq!(snap.classification.map(|c| c.decision), Some(Decision::Warning));
    let last = snap.last_cycle.expect("cycle report");
    assert_eq!(last.cycle, 1);
    assert_eq!(last.outcome, CycleOutcome::Published { ack: "1".into() });
}

#[tokio::test(start_paused = true)]
async fn run_until_stops_on_shutdown() {
    let publisher = RecordingPublisher::default();
    let scheduler = Scheduler::new(
        ScriptedSource::lines(&["A1,tempC=22.0,mq2=120,flame=0"]),
        publisher.clone(),
        settings(),
        status(),
    );

    scheduler
        .run_until(tokio::time::sleep(Duration::from_secs(40)))
        .await;

    // deadlines at 15s and ~30s; the third would be ~45s
    assert_eq!(publisher.calls().len(), 2);
}
