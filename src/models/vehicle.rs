//! Modelo de Vehicle
//!
//! Este módulo contiene el struct Vehicle y los enums de estado/listado.
//! Mapea exactamente al schema PostgreSQL con primary key 'id'.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// Estado del vehículo - mapea al ENUM vehicle_status
///
/// `Sold` es un valor almacenado, nunca una etiqueta sintetizada al leer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "vehicle_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VehicleStatus {
    Available,
    Rented,
    Maintenance,
    Inactive,
    Sold,
}

/// Tipo de publicación - mapea al ENUM listing_type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "listing_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ListingType {
    Rent,
    Sale,
}

/// Vehicle principal - mapea exactamente a la tabla vehicles
///
/// `daily_rate` y `selling_price` son mutuamente excluyentes: un vehículo
/// en alquiler tiene tarifa diaria y un vehículo en venta tiene precio fijo.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Vehicle {
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

impl Vehicle {
    /// Un vehículo en venta no tiene calendario: su disponibilidad depende
    /// solo del campo status
    pub fn is_for_sale(&self) -> bool {
        self.listing_type == ListingType::Sale
    }

    pub fn is_available(&self) -> bool {
        self.status == VehicleStatus::Available
    }
}
