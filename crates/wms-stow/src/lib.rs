//! WMS Stow bounded context.
//!
//! Putaway tasks move received units from a tote into a storage location.
//! Every state change is saved together with its outbox records through
//! [`wms_outbox::TransactionalWriter`].

pub mod application;
pub mod domain;
