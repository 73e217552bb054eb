//! ==============================================================================
//! domain.rs - readings, verdicts and the shared status snapshot
//! ==============================================================================
//!
//! purpose:
//!     plain data passed between the parser, classifier, publisher and the
//!     status server. nothing in here performs i/o.
//!
//! relationships:
//!     - produced by: parser.rs (Reading), classifier.rs (Classification)
//!     - consumed by: publisher.rs, scheduler.rs, server.rs
//!
//! ==============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// one decoded telemetry sample from the serial link
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// device-reported milliseconds (0 when the device did not send `ms`)
    pub timestamp_ms: u64,
    /// temperature in celsius
    pub temperature_c: f64,
    /// raw mq2 gas sensor value
    pub gas_level: i64,
    /// raw flame sensor value
    pub flame_raw: i64,
    /// free-text gas label sent by the node (may be empty)
    pub gas_label: String,
    /// free-text light label sent by the node (may be empty)
    pub light_label: String,
}

/// overall verdict for a reading
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Normal,
    Warning,
    HighRisk,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Normal => "NORMAL",
            Decision::Warning => "WARNING",
            Decision::HighRisk => "HIGH_RISK",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// which rule produced the decision
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reason {
    #[serde(rename = "NORMAL")]
    Normal,
    #[serde(rename = "MQ2_WARN")]
    Mq2Warn,
    #[serde(rename = "MQ2_DANGER")]
    Mq2Danger,
    #[serde(rename = "FLAME")]
    Flame,
}

impl Reason {
    pub fn as_str(self) -> &'static str {
        match self {
            Reason::Normal => "NORMAL",
            Reason::Mq2Warn => "MQ2_WARN",
            Reason::Mq2Danger => "MQ2_DANGER",
            Reason::Flame => "FLAME",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// risk verdict derived from a single reading
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub flame_detected: bool,
    /// 0.0 ..= 1.0, one fixed value per tier
    pub risk_score: f64,
    pub decision: Decision,
    pub reason: Reason,
    /// true iff decision is HIGH_RISK
    pub alarm: bool,
}

// ==============================================================================
// cycle reporting
// ==============================================================================

/// what happened at a publish boundary
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// endpoint accepted the update; `ack` is its trimmed response body
    Published { ack: String },
    /// the single attempt for this cycle failed
    Failed { error: String },
    /// nothing has been parsed yet, so there was nothing to send
    Skipped,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CycleReport {
    /// 1-based cycle counter
    pub cycle: u64,
    /// unix timestamp (ms) when the cycle finished
    pub finished_at_ms: u64,
    /// the reading that was sent (None when skipped)
    pub reading: Option<Reading>,
    pub classification: Option<Classification>,
    pub outcome: CycleOutcome,
}

/// read-only view of the scheduler, served by the status endpoint
#[derive(Clone, Debug, Default, Serialize)]
pub struct StatusSnapshot {
    /// most recent valid reading
    pub latest: Option<Reading>,
    /// classification of `latest`
    pub classification: Option<Classification>,
    /// unix timestamp (ms) of the next scheduled publish
    pub next_publish_at_ms: u64,
    pub last_cycle: Option<CycleReport>,
    pub cycles: u64,
    pub lines_accepted: u64,
    pub lines_rejected: u64,
}

/// current unix time in milliseconds (0 if the clock is before the epoch)
pub fn unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
