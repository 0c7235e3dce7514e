//! Shared test doubles for WMS outbox services.

mod bus;
mod clock;
mod datastore;

pub use bus::{Delivery, FailingBus, RecordingBus};
pub use clock::{FixedClock, ManualClock};
pub use datastore::InMemoryDatastore;
