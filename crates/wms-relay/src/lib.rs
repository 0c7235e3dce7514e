//! WMS outbox relay service.
//!
//! Runs the [`wms_outbox::OutboxPublisher`] against the PostgreSQL outbox
//! and a Redis Streams bus, and serves health and backlog endpoints.

pub mod config;
pub mod error;
pub mod redis_bus;
pub mod routes;
pub mod state;
