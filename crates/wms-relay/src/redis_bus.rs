//! Redis Streams implementation of the message bus.
//!
//! Each destination is a stream. An envelope becomes one `XADD` entry with
//! the partition key, event id, event type and the serialized envelope as
//! fields; the entry id Redis returns is the acknowledgement.

use std::fmt;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisError};
use tracing::debug;
use wms_core::bus::MessageBus;
use wms_core::envelope::Envelope;
use wms_core::error::DeliveryError;

/// Bus adapter appending envelopes to Redis Streams.
#[derive(Clone)]
pub struct RedisStreamBus {
    connection: MultiplexedConnection,
}

impl fmt::Debug for RedisStreamBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStreamBus").finish_non_exhaustive()
    }
}

impl RedisStreamBus {
    /// Opens a multiplexed connection to `redis_url`.
    ///
    /// # Errors
    ///
    /// Returns the Redis error if the URL is invalid or the server is
    /// unreachable.
    pub async fn connect(redis_url: &str) -> Result<Self, RedisError> {
        let client = Client::open(redis_url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        Ok(Self { connection })
    }
}

/// Stream entry fields for one envelope.
///
/// # Errors
///
/// Returns `DeliveryError::Encoding` if the envelope cannot be serialized.
pub fn stream_fields(
    partition_key: &str,
    envelope: &Envelope,
) -> Result<Vec<(&'static str, String)>, DeliveryError> {
    let body =
        serde_json::to_string(envelope).map_err(|e| DeliveryError::Encoding(e.to_string()))?;
    Ok(vec![
        ("partitionKey", partition_key.to_owned()),
        ("id", envelope.id.to_string()),
        ("type", envelope.event_type.clone()),
        ("envelope", body),
    ])
}

fn classify(err: &RedisError) -> DeliveryError {
    if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
        DeliveryError::Unavailable(err.to_string())
    } else {
        DeliveryError::Rejected(err.to_string())
    }
}

#[async_trait]
impl MessageBus for RedisStreamBus {
    async fn publish(
        &self,
        destination: &str,
        partition_key: &str,
        envelope: &Envelope,
    ) -> Result<(), DeliveryError> {
        let fields = stream_fields(partition_key, envelope)?;
        let mut connection = self.connection.clone();
        let entry_id: String = connection
            .xadd(destination, "*", fields.as_slice())
            .await
            .map_err(|e| classify(&e))?;
        debug!(
            destination,
            event_id = %envelope.id,
            entry_id = %entry_id,
            "appended to stream"
        );
        Ok(())
    }
}
