//! Command handlers for the Shipping context.
//!
//! This module contains application-level command handler functions that
//! orchestrate domain logic: load aggregate, execute command, save state and
//! outbox records together.

use uuid::Uuid;
use wms_core::aggregate::AggregateRoot;
use wms_core::clock::Clock;
use wms_core::command::Command;
use wms_core::error::DomainError;
use wms_outbox::TransactionalWriter;

use crate::domain::aggregates::{NewShipment, Shipment, ShipmentStatus};
use crate::domain::commands::{
    AddToManifest, CancelShipment, ConfirmDelivery, ConfirmShipment, CreateShipment,
    GenerateLabel,
};

/// Result of a successfully handled command.
#[derive(Debug, Clone)]
pub struct ShippingCommandResult {
    /// The shipment affected by the command.
    pub shipment_id: String,
    /// Status after the command.
    pub status: ShipmentStatus,
    /// Version after the save.
    pub version: i64,
    /// Ids of the outbox records written, in emission order.
    pub event_ids: Vec<Uuid>,
}

async fn persist(
    mut shipment: Shipment,
    command: &impl Command,
    writer: &TransactionalWriter,
) -> Result<ShippingCommandResult, DomainError> {
    let outcome = writer
        .save(&mut shipment, &command.correlation_context())
        .await?;
    Ok(ShippingCommandResult {
        shipment_id: shipment.shipment_id().to_owned(),
        status: shipment.status(),
        version: outcome.version,
        event_ids: outcome.event_ids,
    })
}

/// Handles the `CreateShipment` command.
///
/// # Errors
///
/// Returns `DomainError::Validation` for bad input,
/// `DomainError::ConcurrencyConflict` if the shipment id already exists, or
/// `DomainError::Persistence` if the save fails.
pub async fn handle_create_shipment(
    command: &CreateShipment,
    clock: &dyn Clock,
    writer: &TransactionalWriter,
) -> Result<ShippingCommandResult, DomainError> {
    let shipment = Shipment::create(
        NewShipment {
            shipment_id: command.shipment_id.clone(),
            order_id: command.order_id.clone(),
            wave_id: command.wave_id.clone(),
            carrier: command.carrier.clone(),
            package: command.package.clone(),
            recipient: command.recipient.clone(),
            shipper: command.shipper.clone(),
        },
        clock,
    )?;
    persist(shipment, command, writer).await
}

/// Handles the `GenerateLabel` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound`, `DomainError::InvalidTransition`,
/// `DomainError::Validation`, or a save error.
pub async fn handle_generate_label(
    command: &GenerateLabel,
    clock: &dyn Clock,
    writer: &TransactionalWriter,
) -> Result<ShippingCommandResult, DomainError> {
    let mut shipment: Shipment = writer.load(&command.shipment_id).await?;
    shipment.generate_label(command.label.clone(), clock)?;
    persist(shipment, command, writer).await
}

/// Handles the `AddToManifest` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound`, `DomainError::InvalidTransition`,
/// `DomainError::Validation`, or a save error.
pub async fn handle_add_to_manifest(
    command: &AddToManifest,
    clock: &dyn Clock,
    writer: &TransactionalWriter,
) -> Result<ShippingCommandResult, DomainError> {
    let mut shipment: Shipment = writer.load(&command.shipment_id).await?;
    shipment.add_to_manifest(command.manifest.clone(), clock)?;
    persist(shipment, command, writer).await
}

/// Handles the `ConfirmShipment` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound`, `DomainError::InvalidTransition`,
/// or a save error.
pub async fn handle_confirm_shipment(
    command: &ConfirmShipment,
    clock: &dyn Clock,
    writer: &TransactionalWriter,
) -> Result<ShippingCommandResult, DomainError> {
    let mut shipment: Shipment = writer.load(&command.shipment_id).await?;
    shipment.confirm_shipment(command.estimated_delivery, clock)?;
    persist(shipment, command, writer).await
}

/// Handles the `ConfirmDelivery` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound`, `DomainError::InvalidTransition`,
/// or a save error.
pub async fn handle_confirm_delivery(
    command: &ConfirmDelivery,
    clock: &dyn Clock,
    writer: &TransactionalWriter,
) -> Result<ShippingCommandResult, DomainError> {
    let mut shipment: Shipment = writer.load(&command.shipment_id).await?;
    shipment.confirm_delivery(command.delivered_at, clock)?;
    persist(shipment, command, writer).await
}

/// Handles the `CancelShipment` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound`, `DomainError::InvalidTransition`,
/// or a save error.
pub async fn handle_cancel_shipment(
    command: &CancelShipment,
    clock: &dyn Clock,
    writer: &TransactionalWriter,
) -> Result<ShippingCommandResult, DomainError> {
    let mut shipment: Shipment = writer.load(&command.shipment_id).await?;
    shipment.cancel(&command.reason, clock)?;
    persist(shipment, command, writer).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, TimeZone, Utc};
    use uuid::Uuid;
    use wms_core::envelope::EnvelopeRegistry;
    use wms_core::error::DomainError;
    use wms_test_support::{FixedClock, InMemoryDatastore};

    use super::*;
    use crate::domain::aggregates::{Address, Carrier, ManifestEntry, PackageInfo, ShippingLabel};
    use crate::domain::events::{self, SHIPMENTS_OUTBOUND_DESTINATION, SHIPPING_EVENTS_DESTINATION};

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
    }

    fn writer(store: &InMemoryDatastore) -> TransactionalWriter {
        let mut registry = EnvelopeRegistry::new();
        events::register_routes(&mut registry).unwrap();
        TransactionalWriter::new(
            Arc::new(store.clone()),
            Arc::new(registry),
            Arc::new(FixedClock(fixed_now())),
        )
    }

    fn address() -> Address {
        Address {
            name: "Customer".to_owned(),
            street1: "9 Elm St".to_owned(),
            city: "Boise".to_owned(),
            state: "ID".to_owned(),
            postal_code: "83702".to_owned(),
            country: "US".to_owned(),
        }
    }

    fn create_command(shipment_id: &str) -> CreateShipment {
        CreateShipment {
            correlation_id: Uuid::new_v4(),
            shipment_id: shipment_id.to_owned(),
            order_id: "O-77".to_owned(),
            wave_id: Some("WAVE-3".to_owned()),
            carrier: Carrier {
                code: "FEDEX".to_owned(),
                name: "FedEx".to_owned(),
                account_id: "ACCT".to_owned(),
                service_type: "EXPRESS".to_owned(),
            },
            package: PackageInfo {
                package_id: "PKG-1".to_owned(),
                weight_kg: 1.2,
                dimensions_cm: [20.0, 15.0, 10.0],
                package_type: "BOX".to_owned(),
            },
            recipient: address(),
            shipper: address(),
        }
    }

    async fn ship(shipment_id: &str, clock: &FixedClock, writer: &TransactionalWriter) {
        handle_create_shipment(&create_command(shipment_id), clock, writer)
            .await
            .unwrap();
        handle_generate_label(
            &GenerateLabel {
                correlation_id: Uuid::new_v4(),
                shipment_id: shipment_id.to_owned(),
                label: ShippingLabel {
                    tracking_number: "7946".to_owned(),
                    label_format: "PDF".to_owned(),
                    label_url: None,
                    generated_at: clock.0,
                },
            },
            clock,
            writer,
        )
        .await
        .unwrap();
        handle_add_to_manifest(
            &AddToManifest {
                correlation_id: Uuid::new_v4(),
                shipment_id: shipment_id.to_owned(),
                manifest: ManifestEntry {
                    manifest_id: "MAN-1".to_owned(),
                    carrier_code: "FEDEX".to_owned(),
                    shipment_count: 4,
                },
            },
            clock,
            writer,
        )
        .await
        .unwrap();
        handle_confirm_shipment(
            &ConfirmShipment {
                correlation_id: Uuid::new_v4(),
                shipment_id: shipment_id.to_owned(),
                estimated_delivery: Some(clock.0 + Duration::days(2)),
            },
            clock,
            writer,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_handle_create_shipment_persists_record() {
        let store = InMemoryDatastore::new();
        let writer = writer(&store);
        let command = create_command("S1");

        let result = handle_create_shipment(&command, &FixedClock(fixed_now()), &writer)
            .await
            .unwrap();

        assert_eq!(result.status, ShipmentStatus::Pending);
        assert_eq!(result.version, 1);
        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].destination, SHIPPING_EVENTS_DESTINATION);
        assert_eq!(records[0].aggregate_type, "shipment");
        let envelope = records[0].decode_envelope().unwrap();
        assert_eq!(envelope.source, "shipment/S1");
        assert_eq!(envelope.correlation_id, command.correlation_id);
    }

    #[tokio::test]
    async fn test_ship_confirmation_goes_to_outbound_stream() {
        // Arrange
        let store = InMemoryDatastore::new();
        let writer = writer(&store);
        let clock = FixedClock(fixed_now());

        // Act
        ship("S1", &clock, &writer).await;

        // Assert
        let records = store.records();
        assert_eq!(records.len(), 4);
        let shipped = &records[3];
        assert_eq!(shipped.event_type, "shipping.shipment.shipped");
        assert_eq!(shipped.destination, SHIPMENTS_OUTBOUND_DESTINATION);
        let envelope = shipped.decode_envelope().unwrap();
        assert_eq!(envelope.data["orderStatus"], "shipped");
        assert_eq!(envelope.data["trackingNumber"], "7946");
        assert_eq!(
            store.aggregate("shipment", "S1").unwrap().status,
            "shipped"
        );
    }

    #[tokio::test]
    async fn test_confirm_delivery_after_ship() {
        let store = InMemoryDatastore::new();
        let writer = writer(&store);
        let clock = FixedClock(fixed_now());
        ship("S1", &clock, &writer).await;

        let result = handle_confirm_delivery(
            &ConfirmDelivery {
                correlation_id: Uuid::new_v4(),
                shipment_id: "S1".to_owned(),
                delivered_at: fixed_now() + Duration::days(1),
            },
            &clock,
            &writer,
        )
        .await
        .unwrap();

        assert_eq!(result.status, ShipmentStatus::Delivered);
        assert_eq!(result.version, 5);
    }

    #[tokio::test]
    async fn test_cancel_after_ship_is_rejected_and_writes_nothing() {
        // Arrange
        let store = InMemoryDatastore::new();
        let writer = writer(&store);
        let clock = FixedClock(fixed_now());
        ship("S1", &clock, &writer).await;

        // Act
        let result = handle_cancel_shipment(
            &CancelShipment {
                correlation_id: Uuid::new_v4(),
                shipment_id: "S1".to_owned(),
                reason: "too late".to_owned(),
            },
            &clock,
            &writer,
        )
        .await;

        // Assert
        match result.unwrap_err() {
            DomainError::InvalidTransition { from, .. } => assert_eq!(from, "shipped"),
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
        assert_eq!(store.records().len(), 4);
        assert_eq!(store.aggregate("shipment", "S1").unwrap().version, 4);
    }

    #[tokio::test]
    async fn test_duplicate_create_is_a_conflict() {
        let store = InMemoryDatastore::new();
        let writer = writer(&store);
        let clock = FixedClock(fixed_now());
        handle_create_shipment(&create_command("S1"), &clock, &writer)
            .await
            .unwrap();

        let result = handle_create_shipment(&create_command("S1"), &clock, &writer).await;

        assert!(matches!(
            result,
            Err(DomainError::ConcurrencyConflict { .. })
        ));
        assert_eq!(store.records().len(), 1);
    }
}
