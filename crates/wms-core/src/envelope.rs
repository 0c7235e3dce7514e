//! Transport envelope and the event-type dispatch table.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::DomainError;
use crate::event::is_valid_event_type;

/// Envelope format version.
pub const SPEC_VERSION: &str = "1.0";

/// Content type of the envelope's `data` member.
pub const DATA_CONTENT_TYPE: &str = "application/json";

/// Request-scoped correlation carried into every envelope built for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationContext {
    /// Identifier tying together every event caused by one request.
    pub correlation_id: Uuid,
}

impl CorrelationContext {
    /// Creates a context for an existing correlation id.
    #[must_use]
    pub fn new(correlation_id: Uuid) -> Self {
        Self { correlation_id }
    }

    /// Creates a context with a fresh correlation id.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::now_v7())
    }
}

/// Transport envelope around one domain event.
///
/// The id is assigned once, when the outbox record is written, and survives
/// every redelivery so consumers can deduplicate on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Always [`SPEC_VERSION`].
    pub specversion: String,
    /// Globally unique event id.
    pub id: Uuid,
    /// Event-type name, `<domain>.<entity>.<verb>`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// `<entity-kind>/<entity-id>` of the emitting aggregate.
    pub source: String,
    /// When the envelope was built.
    pub time: DateTime<Utc>,
    /// Correlation id of the request that caused the event.
    #[serde(rename = "correlationId")]
    pub correlation_id: Uuid,
    /// Always [`DATA_CONTENT_TYPE`].
    pub datacontenttype: String,
    /// Event payload.
    pub data: serde_json::Value,
}

/// Builds envelopes stamped with the injected clock's time.
#[derive(Clone)]
pub struct EnvelopeFactory {
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for EnvelopeFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvelopeFactory").finish_non_exhaustive()
    }
}

impl EnvelopeFactory {
    /// Creates a factory reading time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Wraps `payload` in a new envelope with a fresh id.
    #[must_use]
    pub fn create(
        &self,
        event_type: &str,
        source: &str,
        payload: serde_json::Value,
        ctx: &CorrelationContext,
    ) -> Envelope {
        Envelope {
            specversion: SPEC_VERSION.to_owned(),
            id: Uuid::now_v7(),
            event_type: event_type.to_owned(),
            source: source.to_owned(),
            time: self.clock.now(),
            correlation_id: ctx.correlation_id,
            datacontenttype: DATA_CONTENT_TYPE.to_owned(),
            data: payload,
        }
    }
}

/// Input handed to an [`EnvelopeBuilder`].
#[derive(Debug)]
pub struct EnvelopeInput<'a> {
    /// Event-type name.
    pub event_type: &'a str,
    /// Source path of the emitting aggregate.
    pub source: &'a str,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// Correlation of the request being saved.
    pub ctx: &'a CorrelationContext,
}

/// Builds an envelope for one event type. Custom builders may reshape the
/// payload before delegating to the factory.
pub type EnvelopeBuilder = fn(&EnvelopeFactory, EnvelopeInput<'_>) -> Envelope;

/// The default builder: payload passes through unchanged.
#[must_use]
pub fn default_builder(factory: &EnvelopeFactory, input: EnvelopeInput<'_>) -> Envelope {
    factory.create(input.event_type, input.source, input.payload, input.ctx)
}

/// Where an event type is delivered and how its envelope is built.
#[derive(Debug, Clone)]
pub struct EventRoute {
    /// Topic or stream the event is delivered to.
    pub destination: String,
    /// Envelope-building function.
    pub builder: EnvelopeBuilder,
}

impl EventRoute {
    /// Builds the envelope for one event through this route's builder.
    #[must_use]
    pub fn build(&self, factory: &EnvelopeFactory, input: EnvelopeInput<'_>) -> Envelope {
        (self.builder)(factory, input)
    }
}

/// Dispatch table from event-type name to [`EventRoute`].
///
/// Populated once at startup by each bounded context, then shared read-only.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeRegistry {
    routes: HashMap<String, EventRoute>,
}

impl EnvelopeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `event_type` with the default builder.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the name is malformed, the
    /// destination is blank, or the type is already registered.
    pub fn register(&mut self, event_type: &str, destination: &str) -> Result<(), DomainError> {
        self.register_with(event_type, destination, default_builder)
    }

    /// Registers `event_type` with a custom builder.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the name is malformed, the
    /// destination is blank, or the type is already registered.
    pub fn register_with(
        &mut self,
        event_type: &str,
        destination: &str,
        builder: EnvelopeBuilder,
    ) -> Result<(), DomainError> {
        if !is_valid_event_type(event_type) {
            return Err(DomainError::Validation(format!(
                "event type '{event_type}' must be <domain>.<entity>.<verb>"
            )));
        }
        if destination.trim().is_empty() {
            return Err(DomainError::Validation(format!(
                "event type '{event_type}' needs a destination"
            )));
        }
        if self.routes.contains_key(event_type) {
            return Err(DomainError::Validation(format!(
                "event type '{event_type}' is already registered"
            )));
        }
        self.routes.insert(
            event_type.to_owned(),
            EventRoute {
                destination: destination.to_owned(),
                builder,
            },
        );
        Ok(())
    }

    /// Looks up the route for `event_type`.
    #[must_use]
    pub fn route(&self, event_type: &str) -> Option<&EventRoute> {
        self.routes.get(event_type)
    }

    /// Looks up the route for `event_type`, failing if none is registered.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for an unrouted event type.
    pub fn require_route(&self, event_type: &str) -> Result<&EventRoute, DomainError> {
        self.route(event_type).ok_or_else(|| {
            DomainError::Validation(format!("no route registered for event type '{event_type}'"))
        })
    }

    /// Number of registered event types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
