//! DTOs de vehículos (solo lectura)
//!
//! El CRUD de vehículos es de otra pantalla del marketplace; los flujos de
//! reserva solo necesitan consultar.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::models::vehicle::{ListingType, Vehicle, VehicleStatus};

/// Response de vehículo para la API
#[derive(Debug, Serialize)]
pub struct VehicleResponse {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub listing_type: ListingType,
    pub daily_rate: Option<Decimal>,
    pub selling_price: Option<Decimal>,
    pub status: VehicleStatus,
    pub created_at: DateTime<Utc>,
}

impl From<Vehicle> for VehicleResponse {
    fn from(vehicle: Vehicle) -> Self {
        Self {
            id: vehicle.id,
            owner_id: vehicle.owner_id,
            brand: vehicle.brand,
            model: vehicle.model,
            listing_type: vehicle.listing_type,
            daily_rate: vehicle.daily_rate,
            selling_price: vehicle.selling_price,
            status: vehicle.status,
            created_at: vehicle.created_at,
        }
    }
}
