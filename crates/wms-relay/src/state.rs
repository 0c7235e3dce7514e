//! Shared application state.

use std::sync::Arc;

use wms_core::outbox::OutboxStore;
use wms_outbox::publisher::PublisherStats;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Outbox read side, used by the inspection endpoints.
    pub outbox: Arc<dyn OutboxStore>,
    /// Counters of the running publisher.
    pub publisher_stats: Arc<PublisherStats>,
    /// Failed attempts after which the publisher parks a record.
    pub attempt_limit: i32,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        publisher_stats: Arc<PublisherStats>,
        attempt_limit: i32,
    ) -> Self {
        Self {
            outbox,
            publisher_stats,
            attempt_limit,
        }
    }
}
