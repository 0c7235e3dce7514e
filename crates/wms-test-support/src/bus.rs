//! Test buses — mock `MessageBus` implementations for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;
use wms_core::bus::MessageBus;
use wms_core::envelope::Envelope;
use wms_core::error::DeliveryError;

/// One acknowledged delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Topic or stream the envelope was sent to.
    pub destination: String,
    /// Partition key the envelope was sent with.
    pub partition_key: String,
    /// The delivered envelope.
    pub envelope: Envelope,
}

/// A bus that records every acknowledged delivery. Failures and stalls can be
/// scripted per partition key or for the next N calls.
#[derive(Debug, Default)]
pub struct RecordingBus {
    deliveries: Mutex<Vec<Delivery>>,
    fail_next: Mutex<usize>,
    fail_partitions: Mutex<HashMap<String, usize>>,
    stall: Mutex<Option<Duration>>,
}

impl RecordingBus {
    /// Create a bus that acknowledges everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `times` publish calls with `DeliveryError::Unavailable`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail_times(&self, times: usize) {
        *self.fail_next.lock().unwrap() = times;
    }

    /// Fails the next `times` publish calls for `partition_key`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail_partition(&self, partition_key: &str, times: usize) {
        self.fail_partitions
            .lock()
            .unwrap()
            .insert(partition_key.to_owned(), times);
    }

    /// Delays every acknowledgement by `delay`. `None` clears it.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn stall(&self, delay: Option<Duration>) {
        *self.stall.lock().unwrap() = delay;
    }

    /// Returns a snapshot of every acknowledged delivery.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }

    /// Returns the ids of every acknowledged envelope, in delivery order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn delivered_ids(&self) -> Vec<Uuid> {
        self.deliveries
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.envelope.id)
            .collect()
    }

    /// Returns the event types delivered for one partition key, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn event_types_for(&self, partition_key: &str) -> Vec<String> {
        self.deliveries
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.partition_key == partition_key)
            .map(|d| d.envelope.event_type.clone())
            .collect()
    }

    fn take_scripted_failure(&self, partition_key: &str) -> bool {
        let mut next = self.fail_next.lock().unwrap();
        if *next > 0 {
            *next -= 1;
            return true;
        }
        let mut partitions = self.fail_partitions.lock().unwrap();
        match partitions.get_mut(partition_key) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl MessageBus for RecordingBus {
    async fn publish(
        &self,
        destination: &str,
        partition_key: &str,
        envelope: &Envelope,
    ) -> Result<(), DeliveryError> {
        let stall = *self.stall.lock().unwrap();
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        if self.take_scripted_failure(partition_key) {
            return Err(DeliveryError::Unavailable("scripted failure".into()));
        }
        self.deliveries.lock().unwrap().push(Delivery {
            destination: destination.to_owned(),
            partition_key: partition_key.to_owned(),
            envelope: envelope.clone(),
        });
        Ok(())
    }
}

/// A bus that refuses every delivery. Useful for testing retry paths.
#[derive(Debug)]
pub struct FailingBus;

#[async_trait]
impl MessageBus for FailingBus {
    async fn publish(
        &self,
        _destination: &str,
        _partition_key: &str,
        _envelope: &Envelope,
    ) -> Result<(), DeliveryError> {
        Err(DeliveryError::Unavailable("connection refused".into()))
    }
}
