//! Domain layer for the Shipping context.

pub mod aggregates;
pub mod commands;
pub mod events;
