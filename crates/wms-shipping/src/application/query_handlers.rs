//! Query handlers for the Shipping context.

use chrono::{DateTime, Utc};
use serde::Serialize;
use wms_core::aggregate::AggregateRoot;
use wms_core::error::DomainError;
use wms_outbox::TransactionalWriter;

use crate::domain::aggregates::{Shipment, ShipmentStatus};

/// Read-only view of a shipment.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentView {
    pub shipment_id: String,
    pub order_id: String,
    pub status: ShipmentStatus,
    pub carrier: String,
    pub tracking_number: Option<String>,
    pub manifest_id: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub actual_delivery: Option<DateTime<Utc>>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

/// Retrieves a shipment by its business key.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the shipment does not exist,
/// or `DomainError::Persistence` if the read fails.
pub async fn get_shipment(
    shipment_id: &str,
    writer: &TransactionalWriter,
) -> Result<ShipmentView, DomainError> {
    let shipment: Shipment = writer.load(shipment_id).await?;
    Ok(ShipmentView {
        tracking_number: shipment.tracking_number().map(str::to_owned),
        manifest_id: shipment.manifest.as_ref().map(|m| m.manifest_id.clone()),
        version: shipment.version(),
        shipment_id: shipment.shipment_id,
        order_id: shipment.order_id,
        status: shipment.status,
        carrier: shipment.carrier.code,
        estimated_delivery: shipment.estimated_delivery,
        actual_delivery: shipment.actual_delivery,
        updated_at: shipment.updated_at,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;
    use wms_core::envelope::EnvelopeRegistry;
    use wms_test_support::{FixedClock, InMemoryDatastore};

    use super::*;
    use crate::domain::events;

    #[tokio::test]
    async fn test_get_shipment_not_found() {
        let store = InMemoryDatastore::new();
        let mut registry = EnvelopeRegistry::new();
        events::register_routes(&mut registry).unwrap();
        let writer = TransactionalWriter::new(
            Arc::new(store),
            Arc::new(registry),
            Arc::new(FixedClock(
                Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
            )),
        );

        let result = get_shipment("S404", &writer).await;

        match result.unwrap_err() {
            DomainError::AggregateNotFound {
                aggregate_type,
                aggregate_id,
            } => {
                assert_eq!(aggregate_type, "shipment");
                assert_eq!(aggregate_id, "S404");
            }
            other => panic!("expected AggregateNotFound, got {other:?}"),
        }
    }
}
