//! DTOs de reservas
//!
//! Requests y responses de la API de bookings. La response lleva la
//! duración de presentación (ambos extremos incluidos); el importe se
//! factura siempre con la regla canónica de pricing.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::booking::{BookingStatus, PaymentStatus};
use crate::models::vehicle::{ListingType, VehicleStatus};
use crate::repositories::booking_repository::BookingDetailRow;
use crate::services::pricing::display_duration_days;

/// Request para crear una reserva
///
/// `total_price` es el importe calculado por el cliente: se acepta y se
/// compara contra el esperado, pero la pasarela es la fuente de verdad.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateBookingRequest {
    pub vehicle_id: Uuid,

    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,

    #[validate(length(min = 2, max = 50))]
    pub payment_method: String,

    #[validate(length(max = 200))]
    pub pickup_location: Option<String>,

    pub total_price: Option<Decimal>,
}

/// Request para transicionar el estado de una reserva
#[derive(Debug, Deserialize)]
pub struct UpdateBookingStatusRequest {
    pub status: BookingStatus,
}

/// Request para registrar los datos de pago de una reserva
#[derive(Debug, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    #[validate(length(min = 2, max = 50))]
    pub payment_method: String,

    #[validate(length(min = 4, max = 100))]
    pub payment_transaction_id: String,
}

/// Request para verificar un pago contra la pasarela
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyPaymentRequest {
    #[validate(length(min = 4, max = 100))]
    pub transaction_ref: String,
}

/// Parámetros de la limpieza de reservas canceladas antiguas
#[derive(Debug, Deserialize)]
pub struct CleanupParams {
    pub older_than_days: Option<i64>,
}

/// Response de reserva con la proyección de vehículo y partes
#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub vehicle_id: Uuid,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Duración de presentación (incluye ambos extremos); None para ventas
    pub duration_days: Option<i64>,
    pub total_amount: Decimal,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: String,
    pub payment_transaction_id: Option<String>,
    pub pickup_location: Option<String>,
    pub listing_type: ListingType,
    pub vehicle_brand: Option<String>,
    pub vehicle_model: Option<String>,
    pub vehicle_status: VehicleStatus,
    pub owner_id: Uuid,
    pub customer_name: String,
    pub owner_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<BookingDetailRow> for BookingResponse {
    fn from(row: BookingDetailRow) -> Self {
        let duration_days = match (row.start_date, row.end_date) {
            (Some(start), Some(end)) => Some(display_duration_days(start, end)),
            _ => None,
        };

        Self {
            id: row.id,
            customer_id: row.customer_id,
            vehicle_id: row.vehicle_id,
            start_date: row.start_date,
            end_date: row.end_date,
            duration_days,
            total_amount: row.total_amount,
            status: row.status,
            payment_status: row.payment_status,
            payment_method: row.payment_method,
            payment_transaction_id: row.payment_transaction_id,
            pickup_location: row.pickup_location,
            listing_type: row.listing_type,
            vehicle_brand: row.brand,
            vehicle_model: row.model,
            vehicle_status: row.vehicle_status,
            owner_id: row.owner_id,
            customer_name: row.customer_name,
            owner_name: row.owner_name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
