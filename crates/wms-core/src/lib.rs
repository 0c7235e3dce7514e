//! WMS Core — shared domain abstractions.
//!
//! Defines the aggregate state machine, domain events, the transport
//! envelope and its dispatch table, and the contracts for the transactional
//! datastore, the outbox store and the message bus. It contains no
//! infrastructure code.

pub mod aggregate;
pub mod bus;
pub mod clock;
pub mod command;
pub mod envelope;
pub mod error;
pub mod event;
pub mod outbox;
pub mod repository;
