//! Commands for the Shipping context.

use chrono::{DateTime, Utc};
use uuid::Uuid;
use wms_core::command::Command;

use super::aggregates::{Address, Carrier, ManifestEntry, PackageInfo, ShippingLabel};

/// Command to create a shipment.
#[derive(Debug, Clone)]
pub struct CreateShipment {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The shipment identifier.
    pub shipment_id: String,
    /// The order being shipped.
    pub order_id: String,
    /// Wave the order was picked in, if any.
    pub wave_id: Option<String>,
    /// Carrier handling the shipment.
    pub carrier: Carrier,
    /// Physical package.
    pub package: PackageInfo,
    /// Delivery address.
    pub recipient: Address,
    /// Return address.
    pub shipper: Address,
}

impl Command for CreateShipment {
    fn command_type(&self) -> &'static str {
        "shipping.create_shipment"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to attach a carrier label.
#[derive(Debug, Clone)]
pub struct GenerateLabel {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The shipment identifier.
    pub shipment_id: String,
    /// Label issued by the carrier.
    pub label: ShippingLabel,
}

impl Command for GenerateLabel {
    fn command_type(&self) -> &'static str {
        "shipping.generate_label"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to put a shipment on a carrier manifest.
#[derive(Debug, Clone)]
pub struct AddToManifest {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The shipment identifier.
    pub shipment_id: String,
    /// Manifest the shipment joins.
    pub manifest: ManifestEntry,
}

impl Command for AddToManifest {
    fn command_type(&self) -> &'static str {
        "shipping.add_to_manifest"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to confirm carrier pickup.
#[derive(Debug, Clone)]
pub struct ConfirmShipment {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The shipment identifier.
    pub shipment_id: String,
    /// Carrier's delivery estimate.
    pub estimated_delivery: Option<DateTime<Utc>>,
}

impl Command for ConfirmShipment {
    fn command_type(&self) -> &'static str {
        "shipping.confirm_shipment"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to record delivery.
#[derive(Debug, Clone)]
pub struct ConfirmDelivery {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The shipment identifier.
    pub shipment_id: String,
    /// Delivery time reported by the carrier.
    pub delivered_at: DateTime<Utc>,
}

impl Command for ConfirmDelivery {
    fn command_type(&self) -> &'static str {
        "shipping.confirm_delivery"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to cancel a shipment.
#[derive(Debug, Clone)]
pub struct CancelShipment {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The shipment identifier.
    pub shipment_id: String,
    /// Why the shipment was cancelled.
    pub reason: String,
}

impl Command for CancelShipment {
    fn command_type(&self) -> &'static str {
        "shipping.cancel_shipment"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}
