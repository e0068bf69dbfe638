//! Services the bridge exposes for its vehicles

use serde_json::{json, Value};
use tracing::info;
use viper_coordinator::{Coordinator, RefreshResult};
use viper_core::{services, RefreshReason, ServiceCall, VehicleId, DOMAIN};

use crate::{ServiceError, ServiceRegistry, ServiceResult};

/// Register `viper_smartstart.refresh`
///
/// With no data every configured vehicle is refreshed; `vehicle_id` narrows the
/// call to one vehicle. The response lists the outcome per vehicle. Refresh
/// failures keep cached data and are reported, not raised.
pub fn register_vehicle_services(registry: &ServiceRegistry, coordinator: Coordinator) {
    registry.register(
        DOMAIN,
        services::REFRESH,
        move |call: ServiceCall| {
            let coordinator = coordinator.clone();
            async move { refresh(&coordinator, &call).await }
        },
    );
}

async fn refresh(coordinator: &Coordinator, call: &ServiceCall) -> ServiceResult {
    let results = match requested_vehicle(call)? {
        Some(vehicle_id) => {
            if coordinator.vehicle_info(&vehicle_id).is_none() {
                return Err(ServiceError::InvalidData(format!(
                    "unknown vehicle: {vehicle_id}"
                )));
            }
            let result = coordinator.refresh(&vehicle_id, RefreshReason::Manual).await;
            vec![(vehicle_id, result)]
        }
        None => coordinator.refresh_all(RefreshReason::Manual).await,
    };

    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    info!(vehicles = results.len(), failed, "Manual refresh finished");

    Ok(Some(json!({
        "results": results.iter().map(render).collect::<Vec<_>>(),
    })))
}

fn requested_vehicle(call: &ServiceCall) -> Result<Option<VehicleId>, ServiceError> {
    match call.service_data.get("vehicle_id") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(VehicleId::new(s.trim()))),
        Some(Value::Number(n)) => Ok(Some(VehicleId::new(n.to_string()))),
        Some(other) => Err(ServiceError::InvalidData(format!(
            "vehicle_id must be a string or number, got {other}"
        ))),
    }
}

fn render((vehicle_id, result): &(VehicleId, RefreshResult)) -> Value {
    match result {
        Ok(snapshot) => json!({
            "vehicle_id": vehicle_id,
            "success": true,
            "last_updated": snapshot.last_updated,
        }),
        Err(err) => json!({
            "vehicle_id": vehicle_id,
            "success": false,
            "error": err.to_string(),
        }),
    }
}
