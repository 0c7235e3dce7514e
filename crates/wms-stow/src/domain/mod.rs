//! Domain layer for the Stow context.

pub mod aggregates;
pub mod commands;
pub mod events;
