//! Application layer for the Stow context.

pub mod command_handlers;
pub mod query_handlers;
