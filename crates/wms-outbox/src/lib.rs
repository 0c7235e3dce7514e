//! WMS Outbox — the write and relay halves of the transactional outbox.
//!
//! [`TransactionalWriter`] commits aggregate state and its pending events in
//! one transaction; [`OutboxPublisher`] relays the committed events to the
//! message bus with at-least-once delivery.

pub mod publisher;
pub mod writer;

pub use publisher::{BatchReport, OutboxPublisher, PublisherConfig, PublisherHandle, StatsSnapshot};
pub use writer::{SaveOutcome, TransactionalWriter};
