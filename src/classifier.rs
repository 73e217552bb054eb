//! Risk classification for a single reading.
//!
//! Rules are checked in priority order and the first match wins:
//! flame, then gas danger, then gas warning, then normal.

use crate::domain::{Classification, Decision, Reading, Reason};

/// Raw flame sensor value that means "flame seen".
pub const FLAME_DETECTED_VALUE: i64 = 1;
/// MQ2 reading at or above which the gas level is a warning.
pub const MQ2_WARN: i64 = 250;
/// MQ2 reading at or above which the gas level is dangerous.
pub const MQ2_DANGER: i64 = 400;

pub const SCORE_FLAME: f64 = 1.0;
pub const SCORE_MQ2_DANGER: f64 = 0.9;
pub const SCORE_MQ2_WARN: f64 = 0.55;
pub const SCORE_NORMAL: f64 = 0.05;

/// Classify a reading. Total and deterministic.
pub fn classify(reading: &Reading) -> Classification {
    let flame_detected = reading.flame_raw == FLAME_DETECTED_VALUE;

    let (decision, reason, risk_score) = if flame_detected {
        (Decision::HighRisk, Reason::Flame, SCORE_FLAME)
    } else if reading.gas_level >= MQ2_DANGER {
        (Decision::HighRisk, Reason::Mq2Danger, SCORE_MQ2_DANGER)
    } else if reading.gas_level >= MQ2_WARN {
        (Decision::Warning, Reason::Mq2Warn, SCORE_MQ2_WARN)
    } else {
        (Decision::Normal, Reason::Normal, SCORE_NORMAL)
    };

    Classification {
        flame_detected,
        risk_score,
        decision,
        reason,
        alarm: decision == Decision::HighRisk,
    }
}
