//! Application layer for the Shipping context.

pub mod command_handlers;
pub mod query_handlers;
