//! sensor-uplink: serial telemetry → risk verdict → ThingSpeak.
//!
//! The pipeline is parser → classifier → publisher, driven by the
//! [`scheduler::Scheduler`] loop. Everything outside that loop (status
//! server, CLI, config) is plumbing around it.

pub mod classifier;
pub mod cli;
pub mod config;
pub mod domain;
pub mod parser;
pub mod publisher;
pub mod scheduler;
pub mod server;
pub mod transport;

pub use classifier::classify;
pub use domain::{Classification, Decision, Reading, Reason};
pub use parser::{parse_line, LineRejected};
pub use publisher::{Ack, PublishError, Publisher};
pub use scheduler::{Scheduler, SchedulerSettings, SharedStatus};
pub use transport::LineSource;
