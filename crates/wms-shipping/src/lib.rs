//! WMS Shipping bounded context.
//!
//! Responsible for carrier labels, manifests, ship confirmation and
//! delivery tracking of outbound shipments.

pub mod application;
pub mod domain;
