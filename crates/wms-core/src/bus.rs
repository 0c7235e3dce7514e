//! Message bus contract.

use async_trait::async_trait;

use crate::envelope::Envelope;
use crate::error::DeliveryError;

/// Publishes envelopes to a topic or stream and awaits the broker's ack.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Delivers `envelope` to `destination`. `partition_key` is the aggregate
    /// id so a partitioned bus keeps one aggregate's events in order.
    async fn publish(
        &self,
        destination: &str,
        partition_key: &str,
        envelope: &Envelope,
    ) -> Result<(), DeliveryError>;
}
