//! Domain events for the Shipping context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wms_core::envelope::{Envelope, EnvelopeFactory, EnvelopeInput, EnvelopeRegistry};
use wms_core::error::DomainError;
use wms_core::event::DomainEvent;

/// Event type for `ShipmentCreated`.
pub const SHIPMENT_CREATED_EVENT_TYPE: &str = "shipping.shipment.created";
/// Event type for `LabelGenerated`.
pub const LABEL_GENERATED_EVENT_TYPE: &str = "shipping.label.generated";
/// Event type for `ShipmentManifested`.
pub const SHIPMENT_MANIFESTED_EVENT_TYPE: &str = "shipping.shipment.manifested";
/// Event type for `ShipmentShipped`.
pub const SHIPMENT_SHIPPED_EVENT_TYPE: &str = "shipping.shipment.shipped";
/// Event type for `ShipmentDelivered`.
pub const SHIPMENT_DELIVERED_EVENT_TYPE: &str = "shipping.shipment.delivered";
/// Event type for `ShipmentCancelled`.
pub const SHIPMENT_CANCELLED_EVENT_TYPE: &str = "shipping.shipment.cancelled";

/// Stream for Shipping lifecycle events.
pub const SHIPPING_EVENTS_DESTINATION: &str = "wms.shipping.events";
/// Stream read by order-facing consumers once a shipment leaves the dock.
pub const SHIPMENTS_OUTBOUND_DESTINATION: &str = "wms.shipments.outbound";

/// Registers every Shipping event type. Ship confirmations go to
/// [`SHIPMENTS_OUTBOUND_DESTINATION`] through [`outbound_envelope`].
///
/// # Errors
///
/// Returns `DomainError::Validation` if any type is already registered.
pub fn register_routes(registry: &mut EnvelopeRegistry) -> Result<(), DomainError> {
    for event_type in [
        SHIPMENT_CREATED_EVENT_TYPE,
        LABEL_GENERATED_EVENT_TYPE,
        SHIPMENT_MANIFESTED_EVENT_TYPE,
        SHIPMENT_DELIVERED_EVENT_TYPE,
        SHIPMENT_CANCELLED_EVENT_TYPE,
    ] {
        registry.register(event_type, SHIPPING_EVENTS_DESTINATION)?;
    }
    registry.register_with(
        SHIPMENT_SHIPPED_EVENT_TYPE,
        SHIPMENTS_OUTBOUND_DESTINATION,
        outbound_envelope,
    )
}

/// Envelope builder for the outbound stream: stamps `orderStatus` so order
/// consumers need not know Shipping's event vocabulary.
#[must_use]
pub fn outbound_envelope(factory: &EnvelopeFactory, input: EnvelopeInput<'_>) -> Envelope {
    let mut payload = input.payload;
    if let Some(fields) = payload.as_object_mut() {
        fields.insert("orderStatus".to_owned(), serde_json::json!("shipped"));
    }
    factory.create(input.event_type, input.source, payload, input.ctx)
}

/// Emitted when a shipment is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentCreated {
    /// The shipment identifier.
    pub shipment_id: String,
    /// The order being shipped.
    pub order_id: String,
    /// The physical package.
    pub package_id: String,
    /// Carrier code (e.g. `UPS`).
    pub carrier: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Emitted when a carrier label is generated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelGenerated {
    /// The shipment identifier.
    pub shipment_id: String,
    /// Carrier tracking number.
    pub tracking_number: String,
    /// Carrier code.
    pub carrier: String,
    /// Label format (`PDF`, `ZPL`, `PNG`).
    pub label_format: String,
    /// Generation time.
    pub generated_at: DateTime<Utc>,
}

/// Emitted when a shipment is added to a carrier manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentManifested {
    /// The shipment identifier.
    pub shipment_id: String,
    /// The manifest identifier.
    pub manifest_id: String,
    /// Carrier tracking number.
    pub tracking_number: String,
    /// Manifest time.
    pub manifested_at: DateTime<Utc>,
}

/// Emitted when the carrier takes the shipment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentShipped {
    /// The shipment identifier.
    pub shipment_id: String,
    /// The order being shipped.
    pub order_id: String,
    /// Carrier tracking number.
    pub tracking_number: String,
    /// Carrier code.
    pub carrier: String,
    /// Carrier's delivery estimate.
    pub estimated_delivery: Option<DateTime<Utc>>,
    /// Ship time.
    pub shipped_at: DateTime<Utc>,
}

/// Emitted when the carrier confirms delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentDelivered {
    /// The shipment identifier.
    pub shipment_id: String,
    /// The order delivered.
    pub order_id: String,
    /// Carrier tracking number.
    pub tracking_number: String,
    /// Delivery time reported by the carrier.
    pub delivered_at: DateTime<Utc>,
}

/// Emitted when a shipment is cancelled before it ships.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentCancelled {
    /// The shipment identifier.
    pub shipment_id: String,
    /// The order the shipment belonged to.
    pub order_id: String,
    /// Why the shipment was cancelled.
    pub reason: String,
    /// Cancellation time.
    pub cancelled_at: DateTime<Utc>,
}

/// Event payload variants for the Shipping context.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ShippingEventKind {
    /// A shipment has been created.
    ShipmentCreated(ShipmentCreated),
    /// A label has been generated.
    LabelGenerated(LabelGenerated),
    /// The shipment is on a manifest.
    ShipmentManifested(ShipmentManifested),
    /// The shipment has left the building.
    ShipmentShipped(ShipmentShipped),
    /// The shipment has been delivered.
    ShipmentDelivered(ShipmentDelivered),
    /// The shipment has been cancelled.
    ShipmentCancelled(ShipmentCancelled),
}

/// Domain event for the Shipping context.
#[derive(Debug, Clone)]
pub struct ShippingEvent {
    /// When the event occurred.
    pub occurred_at: DateTime<Utc>,
    /// Event-specific payload.
    pub kind: ShippingEventKind,
}

impl DomainEvent for ShippingEvent {
    fn event_type(&self) -> &'static str {
        match &self.kind {
            ShippingEventKind::ShipmentCreated(_) => SHIPMENT_CREATED_EVENT_TYPE,
            ShippingEventKind::LabelGenerated(_) => LABEL_GENERATED_EVENT_TYPE,
            ShippingEventKind::ShipmentManifested(_) => SHIPMENT_MANIFESTED_EVENT_TYPE,
            ShippingEventKind::ShipmentShipped(_) => SHIPMENT_SHIPPED_EVENT_TYPE,
            ShippingEventKind::ShipmentDelivered(_) => SHIPMENT_DELIVERED_EVENT_TYPE,
            ShippingEventKind::ShipmentCancelled(_) => SHIPMENT_CANCELLED_EVENT_TYPE,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    fn to_payload(&self) -> serde_json::Value {
        // Serialization of derived Serialize types to Value is infallible.
        serde_json::to_value(&self.kind).expect("ShippingEventKind serialization is infallible")
    }
}
