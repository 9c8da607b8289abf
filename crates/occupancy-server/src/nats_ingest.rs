//! NATS intake for sensor payloads.
//!
//! [`SensorSubscription`] subscribes to the configured subject and feeds
//! each message, in arrival order, through the ingestion
//! [`Pipeline`]. Messages are handled one at a time, so the stream is
//! consumed at the pace of the pipeline.
//!
//! A payload that is not valid UTF-8 is treated as malformed: it is
//! logged and dropped without touching any state.

use std::sync::Arc;

use futures::StreamExt as _;
use occupancy_core::{IngestError, Pipeline, ReadingSink};
use tracing::{debug, info, warn};

use crate::error::ServiceError;

/// Decode a message body into payload text.
///
/// Returns `None` when the bytes are not valid UTF-8.
pub fn decode_payload(bytes: &[u8]) -> Option<&str> {
    std::str::from_utf8(bytes).ok()
}

/// A connected NATS client bound to the sensor subject.
pub struct SensorSubscription {
    /// The NATS client connection.
    client: async_nats::Client,
    /// Subject the sensor publishes on.
    subject: String,
}

impl SensorSubscription {
    /// Connect to a NATS server.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Nats`] if the connection fails.
    pub async fn connect(url: &str, subject: &str) -> Result<Self, ServiceError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| ServiceError::Nats {
                message: format!("failed to connect to NATS at {url}: {e}"),
            })?;
        info!(url, subject, "Connected to NATS");
        Ok(Self {
            client,
            subject: subject.to_owned(),
        })
    }

    /// The subject this subscription listens on.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Consume sensor messages until the subscription ends.
    ///
    /// Per-message failures (malformed payloads, failed writes) are logged
    /// by the pipeline and never stop the loop.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Nats`] if subscribing fails or the
    /// subscription is closed by the server.
    pub async fn run<S: ReadingSink>(self, pipeline: Arc<Pipeline<S>>) -> Result<(), ServiceError> {
        let mut subscriber = self
            .client
            .subscribe(self.subject.clone())
            .await
            .map_err(|e| ServiceError::Nats {
                message: format!("failed to subscribe to {}: {e}", self.subject),
            })?;
        info!(subject = %self.subject, "Listening for sensor messages");

        while let Some(message) = subscriber.next().await {
            let Some(raw) = decode_payload(&message.payload) else {
                warn!(
                    subject = %message.subject,
                    bytes = message.payload.len(),
                    "dropping sensor payload that is not valid UTF-8"
                );
                continue;
            };

            match pipeline.ingest(raw).await {
                Ok(outcome) => debug!(
                    count = outcome.reading.count(),
                    persisted = outcome.persisted,
                    delivered = outcome.delivered,
                    "sensor message handled"
                ),
                // Already logged with context by the pipeline.
                Err(IngestError::MalformedPayload(_) | IngestError::StorageWrite(_)) => {}
            }
        }

        Err(ServiceError::Nats {
            message: format!("subscription to {} closed", self.subject),
        })
    }
}
