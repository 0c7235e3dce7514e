//! Aggregate roots for the Shipping context.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wms_core::aggregate::{AggregateRoot, PendingEvents, Status, TransitionTable};
use wms_core::clock::Clock;
use wms_core::error::DomainError;

use super::events::{
    LabelGenerated, ShipmentCancelled, ShipmentCreated, ShipmentDelivered, ShipmentManifested,
    ShipmentShipped, ShippingEvent, ShippingEventKind,
};

/// Lifecycle status of a shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    Pending,
    Labeled,
    Manifested,
    Shipped,
    Delivered,
    Cancelled,
}

impl Status for ShipmentStatus {
    const TRANSITIONS: TransitionTable<Self> = TransitionTable::new(&[
        (Self::Pending, &[Self::Labeled, Self::Cancelled]),
        (Self::Labeled, &[Self::Manifested, Self::Cancelled]),
        (Self::Manifested, &[Self::Shipped, Self::Cancelled]),
        (Self::Shipped, &[Self::Delivered]),
        (Self::Delivered, &[]),
        (Self::Cancelled, &[]),
    ]);

    fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Labeled => "labeled",
            Self::Manifested => "manifested",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Carrier handling the shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Carrier {
    /// Carrier code (`UPS`, `FEDEX`, `USPS`).
    pub code: String,
    /// Display name.
    pub name: String,
    /// Shipper account with the carrier.
    pub account_id: String,
    /// Service level (e.g. `GROUND`).
    pub service_type: String,
}

/// Physical package details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInfo {
    /// Package identifier.
    pub package_id: String,
    /// Weight in kilograms.
    pub weight_kg: f64,
    /// Length, width, height in centimetres.
    pub dimensions_cm: [f64; 3],
    /// Packaging type (e.g. `BOX`).
    pub package_type: String,
}

/// Postal address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub name: String,
    pub street1: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

/// A carrier label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingLabel {
    /// Carrier tracking number.
    pub tracking_number: String,
    /// `PDF`, `ZPL` or `PNG`.
    pub label_format: String,
    /// Where the rendered label can be fetched.
    pub label_url: Option<String>,
    /// When the carrier issued the label.
    pub generated_at: DateTime<Utc>,
}

/// A carrier manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    /// Manifest identifier.
    pub manifest_id: String,
    /// Carrier the manifest is for.
    pub carrier_code: String,
    /// Shipments on the manifest.
    pub shipment_count: u32,
}

/// Input for [`Shipment::create`].
#[derive(Debug, Clone)]
pub struct NewShipment {
    pub shipment_id: String,
    pub order_id: String,
    pub wave_id: Option<String>,
    pub carrier: Carrier,
    pub package: PackageInfo,
    pub recipient: Address,
    pub shipper: Address,
}

/// An outbound shipment from label to delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shipment {
    pub(crate) shipment_id: String,
    pub(crate) order_id: String,
    pub(crate) wave_id: Option<String>,
    pub(crate) status: ShipmentStatus,
    pub(crate) carrier: Carrier,
    pub(crate) package: PackageInfo,
    pub(crate) recipient: Address,
    pub(crate) shipper: Address,
    pub(crate) label: Option<ShippingLabel>,
    pub(crate) manifest: Option<ManifestEntry>,
    pub(crate) estimated_delivery: Option<DateTime<Utc>>,
    pub(crate) actual_delivery: Option<DateTime<Utc>>,
    pub(crate) cancellation_reason: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) labeled_at: Option<DateTime<Utc>>,
    pub(crate) manifested_at: Option<DateTime<Utc>>,
    pub(crate) shipped_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub(crate) version: i64,
    #[serde(skip)]
    pending_events: PendingEvents<ShippingEvent>,
}

fn require(value: &str, field: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

// NaN fails every comparison, so `<= 0.0` alone would let it through.
fn require_positive(value: f64, field: &str) -> Result<(), DomainError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(DomainError::Validation(format!(
            "{field} must be a finite number greater than zero"
        )));
    }
    Ok(())
}

impl Shipment {
    /// Creates a pending shipment, producing a `ShipmentCreated` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if an identifier or the carrier code
    /// is blank, or the package weight or a dimension is not a positive
    /// finite number.
    pub fn create(input: NewShipment, clock: &dyn Clock) -> Result<Self, DomainError> {
        require(&input.shipment_id, "shipment id")?;
        require(&input.order_id, "order id")?;
        require(&input.package.package_id, "package id")?;
        require(&input.carrier.code, "carrier code")?;
        require_positive(input.package.weight_kg, "package weight")?;
        for dimension in input.package.dimensions_cm {
            require_positive(dimension, "package dimension")?;
        }

        let now = clock.now();
        let mut shipment = Self {
            shipment_id: input.shipment_id,
            order_id: input.order_id,
            wave_id: input.wave_id,
            status: ShipmentStatus::Pending,
            carrier: input.carrier,
            package: input.package,
            recipient: input.recipient,
            shipper: input.shipper,
            label: None,
            manifest: None,
            estimated_delivery: None,
            actual_delivery: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
            labeled_at: None,
            manifested_at: None,
            shipped_at: None,
            version: 0,
            pending_events: PendingEvents::default(),
        };
        shipment.record(
            now,
            ShippingEventKind::ShipmentCreated(ShipmentCreated {
                shipment_id: shipment.shipment_id.clone(),
                order_id: shipment.order_id.clone(),
                package_id: shipment.package.package_id.clone(),
                carrier: shipment.carrier.code.clone(),
                created_at: now,
            }),
        );
        Ok(shipment)
    }

    /// Business key.
    #[must_use]
    pub fn shipment_id(&self) -> &str {
        &self.shipment_id
    }

    /// Tracking number, once labeled.
    #[must_use]
    pub fn tracking_number(&self) -> Option<&str> {
        self.label.as_ref().map(|l| l.tracking_number.as_str())
    }

    fn record(&mut self, at: DateTime<Utc>, kind: ShippingEventKind) {
        self.updated_at = at;
        self.pending_events.push(ShippingEvent {
            occurred_at: at,
            kind,
        });
    }

    fn tracking_or_empty(&self) -> String {
        self.tracking_number().unwrap_or_default().to_owned()
    }

    /// Attaches a carrier label, producing a `LabelGenerated` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` unless the shipment is
    /// pending, or `DomainError::Validation` for a blank tracking number.
    pub fn generate_label(
        &mut self,
        label: ShippingLabel,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_transition(ShipmentStatus::Labeled, "generate label")?;
        require(&label.tracking_number, "tracking number")?;

        let now = clock.now();
        let event = LabelGenerated {
            shipment_id: self.shipment_id.clone(),
            tracking_number: label.tracking_number.clone(),
            carrier: self.carrier.code.clone(),
            label_format: label.label_format.clone(),
            generated_at: now,
        };
        self.label = Some(label);
        self.status = ShipmentStatus::Labeled;
        self.labeled_at = Some(now);
        self.record(now, ShippingEventKind::LabelGenerated(event));
        Ok(())
    }

    /// Puts the shipment on a carrier manifest, producing a
    /// `ShipmentManifested` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` unless the shipment is
    /// labeled, or `DomainError::Validation` if the manifest is for another
    /// carrier.
    pub fn add_to_manifest(
        &mut self,
        manifest: ManifestEntry,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_transition(ShipmentStatus::Manifested, "add to manifest")?;
        require(&manifest.manifest_id, "manifest id")?;
        if manifest.carrier_code != self.carrier.code {
            return Err(DomainError::Validation(format!(
                "manifest {} is for carrier {}, shipment uses {}",
                manifest.manifest_id, manifest.carrier_code, self.carrier.code
            )));
        }

        let now = clock.now();
        let event = ShipmentManifested {
            shipment_id: self.shipment_id.clone(),
            manifest_id: manifest.manifest_id.clone(),
            tracking_number: self.tracking_or_empty(),
            manifested_at: now,
        };
        self.manifest = Some(manifest);
        self.status = ShipmentStatus::Manifested;
        self.manifested_at = Some(now);
        self.record(now, ShippingEventKind::ShipmentManifested(event));
        Ok(())
    }

    /// Confirms the carrier has taken the shipment, producing a
    /// `ShipmentShipped` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` unless the shipment is
    /// manifested.
    pub fn confirm_shipment(
        &mut self,
        estimated_delivery: Option<DateTime<Utc>>,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_transition(ShipmentStatus::Shipped, "confirm shipment")?;

        let now = clock.now();
        self.status = ShipmentStatus::Shipped;
        self.shipped_at = Some(now);
        self.estimated_delivery = estimated_delivery;
        self.record(
            now,
            ShippingEventKind::ShipmentShipped(ShipmentShipped {
                shipment_id: self.shipment_id.clone(),
                order_id: self.order_id.clone(),
                tracking_number: self.tracking_or_empty(),
                carrier: self.carrier.code.clone(),
                estimated_delivery,
                shipped_at: now,
            }),
        );
        Ok(())
    }

    /// Records carrier-confirmed delivery, producing a `ShipmentDelivered`
    /// event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` unless the shipment has
    /// shipped.
    pub fn confirm_delivery(
        &mut self,
        delivered_at: DateTime<Utc>,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_transition(ShipmentStatus::Delivered, "confirm delivery")?;

        let now = clock.now();
        self.status = ShipmentStatus::Delivered;
        self.actual_delivery = Some(delivered_at);
        self.record(
            now,
            ShippingEventKind::ShipmentDelivered(ShipmentDelivered {
                shipment_id: self.shipment_id.clone(),
                order_id: self.order_id.clone(),
                tracking_number: self.tracking_or_empty(),
                delivered_at,
            }),
        );
        Ok(())
    }

    /// Cancels the shipment, producing a `ShipmentCancelled` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` once shipped, delivered or
    /// cancelled.
    pub fn cancel(&mut self, reason: &str, clock: &dyn Clock) -> Result<(), DomainError> {
        self.ensure_transition(ShipmentStatus::Cancelled, "cancel")?;

        let now = clock.now();
        self.status = ShipmentStatus::Cancelled;
        self.cancellation_reason = Some(reason.to_owned());
        self.record(
            now,
            ShippingEventKind::ShipmentCancelled(ShipmentCancelled {
                shipment_id: self.shipment_id.clone(),
                order_id: self.order_id.clone(),
                reason: reason.to_owned(),
                cancelled_at: now,
            }),
        );
        Ok(())
    }
}

impl AggregateRoot for Shipment {
    type Status = ShipmentStatus;
    type Event = ShippingEvent;
    const AGGREGATE_TYPE: &'static str = "shipment";

    fn aggregate_id(&self) -> &str {
        &self.shipment_id
    }

    fn status(&self) -> ShipmentStatus {
        self.status
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn pending_events(&self) -> &[ShippingEvent] {
        self.pending_events.as_slice()
    }

    fn drain_events(&mut self) -> Vec<ShippingEvent> {
        self.pending_events.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use wms_core::event::DomainEvent;
    use wms_test_support::FixedClock;

    fn clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap())
    }

    fn address(name: &str) -> Address {
        Address {
            name: name.into(),
            street1: "1 Dock Rd".into(),
            city: "Reno".into(),
            state: "NV".into(),
            postal_code: "89501".into(),
            country: "US".into(),
        }
    }

    fn new_shipment() -> NewShipment {
        NewShipment {
            shipment_id: "S1".into(),
            order_id: "O1".into(),
            wave_id: None,
            carrier: Carrier {
                code: "UPS".into(),
                name: "United Parcel Service".into(),
                account_id: "ACME-1".into(),
                service_type: "GROUND".into(),
            },
            package: PackageInfo {
                package_id: "P1".into(),
                weight_kg: 2.5,
                dimensions_cm: [30.0, 20.0, 10.0],
                package_type: "BOX".into(),
            },
            recipient: address("Customer"),
            shipper: address("Warehouse"),
        }
    }

    fn label() -> ShippingLabel {
        ShippingLabel {
            tracking_number: "1Z999AA10123456784".into(),
            label_format: "ZPL".into(),
            label_url: None,
            generated_at: clock().0,
        }
    }

    fn manifest(carrier_code: &str) -> ManifestEntry {
        ManifestEntry {
            manifest_id: "M1".into(),
            carrier_code: carrier_code.into(),
            shipment_count: 12,
        }
    }

    #[test]
    fn test_create_produces_pending_shipment() {
        let shipment = Shipment::create(new_shipment(), &clock()).unwrap();

        assert_eq!(shipment.status(), ShipmentStatus::Pending);
        assert_eq!(shipment.pending_events().len(), 1);
        assert_eq!(
            shipment.pending_events()[0].event_type(),
            "shipping.shipment.created"
        );
    }

    #[test]
    fn test_create_rejects_weightless_package() {
        let mut input = new_shipment();
        input.package.weight_kg = 0.0;

        let result = Shipment::create(input, &clock());

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_create_rejects_non_finite_weight() {
        for weight in [f64::NAN, f64::INFINITY, -1.0] {
            let mut input = new_shipment();
            input.package.weight_kg = weight;

            let result = Shipment::create(input, &clock());

            match result.unwrap_err() {
                DomainError::Validation(msg) => assert!(msg.contains("package weight")),
                other => panic!("expected Validation for {weight}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_create_rejects_bad_dimensions() {
        for dimensions in [
            [f64::NAN, 20.0, 10.0],
            [30.0, 0.0, 10.0],
            [30.0, 20.0, f64::NEG_INFINITY],
        ] {
            let mut input = new_shipment();
            input.package.dimensions_cm = dimensions;

            let result = Shipment::create(input, &clock());

            match result.unwrap_err() {
                DomainError::Validation(msg) => assert!(msg.contains("package dimension")),
                other => panic!("expected Validation for {dimensions:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_full_lifecycle_emits_events_in_order() {
        // Arrange
        let clock = clock();
        let mut shipment = Shipment::create(new_shipment(), &clock).unwrap();
        let eta = clock.0 + Duration::days(3);

        // Act
        shipment.generate_label(label(), &clock).unwrap();
        shipment.add_to_manifest(manifest("UPS"), &clock).unwrap();
        shipment.confirm_shipment(Some(eta), &clock).unwrap();
        shipment
            .confirm_delivery(eta - Duration::hours(4), &clock)
            .unwrap();

        // Assert
        let types: Vec<&str> = shipment
            .pending_events()
            .iter()
            .map(DomainEvent::event_type)
            .collect();
        assert_eq!(
            types,
            vec![
                "shipping.shipment.created",
                "shipping.label.generated",
                "shipping.shipment.manifested",
                "shipping.shipment.shipped",
                "shipping.shipment.delivered",
            ]
        );
        assert_eq!(shipment.status(), ShipmentStatus::Delivered);
        assert_eq!(shipment.tracking_number(), Some("1Z999AA10123456784"));
        assert_eq!(shipment.estimated_delivery, Some(eta));
    }

    #[test]
    fn test_manifest_before_label_is_invalid() {
        let clock = clock();
        let mut shipment = Shipment::create(new_shipment(), &clock).unwrap();

        let result = shipment.add_to_manifest(manifest("UPS"), &clock);

        match result.unwrap_err() {
            DomainError::InvalidTransition {
                aggregate_type,
                from,
                operation,
            } => {
                assert_eq!(aggregate_type, "shipment");
                assert_eq!(from, "pending");
                assert_eq!(operation, "add to manifest");
            }
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
        assert!(shipment.manifest.is_none());
    }

    #[test]
    fn test_manifest_for_other_carrier_is_rejected() {
        let clock = clock();
        let mut shipment = Shipment::create(new_shipment(), &clock).unwrap();
        shipment.generate_label(label(), &clock).unwrap();

        let result = shipment.add_to_manifest(manifest("FEDEX"), &clock);

        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert_eq!(shipment.status(), ShipmentStatus::Labeled);
    }

    #[test]
    fn test_shipped_shipment_cannot_be_cancelled() {
        let clock = clock();
        let mut shipment = Shipment::create(new_shipment(), &clock).unwrap();
        shipment.generate_label(label(), &clock).unwrap();
        shipment.add_to_manifest(manifest("UPS"), &clock).unwrap();
        shipment.confirm_shipment(None, &clock).unwrap();
        shipment.drain_events();

        let result = shipment.cancel("customer request", &clock);

        assert!(matches!(
            result,
            Err(DomainError::InvalidTransition { .. })
        ));
        assert_eq!(shipment.status(), ShipmentStatus::Shipped);
        assert!(shipment.pending_events().is_empty());
    }

    #[test]
    fn test_cancelled_shipment_rejects_label() {
        let clock = clock();
        let mut shipment = Shipment::create(new_shipment(), &clock).unwrap();
        shipment.cancel("address invalid", &clock).unwrap();

        let result = shipment.generate_label(label(), &clock);

        assert!(matches!(
            result,
            Err(DomainError::InvalidTransition { .. })
        ));
        assert_eq!(
            shipment.cancellation_reason.as_deref(),
            Some("address invalid")
        );
    }

    #[test]
    fn test_cancelled_shipment_reports_transition_before_label_validation() {
        let clock = clock();
        let mut shipment = Shipment::create(new_shipment(), &clock).unwrap();
        shipment.cancel("address invalid", &clock).unwrap();
        let mut blank = label();
        blank.tracking_number = "  ".into();

        let result = shipment.generate_label(blank, &clock);

        match result.unwrap_err() {
            DomainError::InvalidTransition { from, operation, .. } => {
                assert_eq!(from, "cancelled");
                assert_eq!(operation, "generate label");
            }
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
    }
}
