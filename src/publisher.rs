//! ==============================================================================
//! publisher.rs - uploads one classified reading per cycle
//! ==============================================================================
//!
//! purpose:
//!     turns a reading + classification into a ThingSpeak update and sends it.
//!     exactly one attempt is made per call; retrying is the next cycle's job.
//!
//! field mapping (form-encoded POST):
//!
//! ```text
//!     api_key  write credential
//!     field1   temperature (C)
//!     field2   mq2 gas level
//!     field3   flame detected (0/1)
//!     field4   risk score (3 decimals)
//!     field5   alarm (0/1)
//!     field6   decision label
//! ```
//!
//! relationships:
//!     - used by: scheduler.rs (once per cadence)
//!     - built by: main.rs from config.rs (UplinkConfig)
//!
//! ==============================================================================

use crate::config::UplinkConfig;
use crate::domain::{Classification, Reading};

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// opaque acknowledgement returned by the endpoint (trimmed body)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack(pub String);

impl Ack {
    /// ThingSpeak answers `0` instead of an entry id when an update is
    /// dropped, usually because it arrived faster than the channel allows.
    pub fn is_rejected_entry(&self) -> bool {
        self.0 == "0"
    }
}

impl fmt::Display for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("endpoint returned HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        reading: &Reading,
        classification: &Classification,
    ) -> Result<Ack, PublishError>;
}

#[async_trait]
impl<P: Publisher + ?Sized> Publisher for Box<P> {
    async fn publish(
        &self,
        reading: &Reading,
        classification: &Classification,
    ) -> Result<Ack, PublishError> {
        (**self).publish(reading, classification).await
    }
}

// ==============================================================================
// payload
// ==============================================================================

/// form body for the ThingSpeak `update` endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateForm<'a> {
    pub api_key: &'a str,
    pub field1: f64,
    pub field2: i64,
    pub field3: u8,
    pub field4: f64,
    pub field5: u8,
    pub field6: &'static str,
}

impl<'a> UpdateForm<'a> {
    pub fn new(api_key: &'a str, reading: &Reading, classification: &Classification) -> Self {
        Self {
            api_key,
            field1: reading.temperature_c,
            field2: reading.gas_level,
            field3: u8::from(classification.flame_detected),
            field4: round3(classification.risk_score),
            field5: u8::from(classification.alarm),
            field6: classification.decision.as_str(),
        }
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

// ==============================================================================
// thingspeak http publisher
// ==============================================================================

pub struct ThingSpeakPublisher {
    client: reqwest::Client,
    url: String,
    write_key: String,
    timeout: Duration,
}

impl ThingSpeakPublisher {
    pub fn new(url: impl Into<String>, write_key: impl Into<String>, timeout: Duration) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(PublishError::Client)?;

        Ok(Self {
            client,
            url: url.into(),
            write_key: write_key.into(),
            timeout,
        })
    }

    pub fn from_config(config: &UplinkConfig) -> Result<Self, PublishError> {
        Self::new(
            config.publish.url.clone(),
            config.publish.write_key.clone(),
            config.publish_timeout(),
        )
    }

    fn map_err(&self, e: reqwest::Error) -> PublishError {
        if e.is_timeout() {
            PublishError::Timeout(self.timeout)
        } else {
            PublishError::Transport(e)
        }
    }
}

#[async_trait]
impl Publisher for ThingSpeakPublisher {
    async fn publish(
        &self,
        reading: &Reading,
        classification: &Classification,
    ) -> Result<Ack, PublishError> {
        let form = UpdateForm::new(&self.write_key, reading, classification);

        let response = self
            .client
            .post(&self.url)
            .form(&form)
            .send()
            .await
            .map_err(|e| self.map_err(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_err(e))?;
        let body = body.trim().to_string();

        if !status.is_success() {
            return Err(PublishError::Status { code: status.as_u16(), body });
        }

        Ok(Ack(body))
    }
}

// ==============================================================================
// dry-run publisher
// ==============================================================================

/// logs the payload it would have sent; never touches the network
#[derive(Debug, Default, Clone)]
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(
        &self,
        reading: &Reading,
        classification: &Classification,
    ) -> Result<Ack, PublishError> {
        let form = UpdateForm::new("<redacted>", reading, classification);
        tracing::info!(
            field1 = form.field1,
            field2 = form.field2,
            field3 = form.field3,
            field4 = form.field4,
            field5 = form.field5,
            field6 = form.field6,
            "[DRY RUN] update not sent"
        );
        Ok(Ack("dry-run".to_string()))
    }
}
