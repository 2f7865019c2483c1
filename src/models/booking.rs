//! Modelo de Booking
//!
//! Este módulo contiene el struct Booking, los enums de estado y la tabla
//! de transiciones legales del ciclo de vida. Mapea exactamente a la tabla
//! bookings del schema PostgreSQL.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// Estado de la reserva - mapea al ENUM booking_status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "booking_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Active,
    Completed,
    Cancelled,
}

impl BookingStatus {
    /// Estados terminales: no admiten más transiciones
    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// Estados que ocupan el calendario del vehículo a efectos de conflicto
    pub fn occupies_calendar(self) -> bool {
        matches!(
            self,
            BookingStatus::Pending | BookingStatus::Confirmed | BookingStatus::Active
        )
    }

    /// Tabla de transiciones del ciclo de vida.
    ///
    /// pending → {confirmed, cancelled}
    /// confirmed → {active, cancelled}
    /// active → {completed, cancelled}
    /// completed / cancelled → (terminal)
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Active)
                | (Confirmed, Cancelled)
                | (Active, Completed)
                | (Active, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Active => "active",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

/// Estado del pago - mapea al ENUM payment_status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
}

/// Booking principal - mapea exactamente a la tabla bookings
///
/// Para ventas las fechas son NULL: la reserva colapsa a una sola
/// transacción sin rango de fechas.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub vehicle_id: Uuid,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub total_amount: Decimal,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: String,
    pub payment_transaction_id: Option<String>,
    pub pickup_location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(BookingStatus::Completed.is_terminal());
        assert!(BookingStatus::Cancelled.is_terminal());
        assert!(!BookingStatus::Pending.is_terminal());
        assert!(!BookingStatus::Active.is_terminal());
    }

    #[test]
    fn test_calendar_occupancy() {
        assert!(BookingStatus::Pending.occupies_calendar());
        assert!(BookingStatus::Confirmed.occupies_calendar());
        assert!(BookingStatus::Active.occupies_calendar());
        assert!(!BookingStatus::Completed.occupies_calendar());
        assert!(!BookingStatus::Cancelled.occupies_calendar());
    }

    #[test]
    fn test_legal_transitions() {
        use BookingStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Active));
        assert!(Confirmed.can_transition_to(Cancelled));
        assert!(Active.can_transition_to(Completed));
    }

    #[test]
    fn test_illegal_transitions() {
        use BookingStatus::*;
        // Los estados terminales no admiten salida
        assert!(!Completed.can_transition_to(Active));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        // No se puede saltar la confirmación
        assert!(!Pending.can_transition_to(Active));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Confirmed.can_transition_to(Completed));
    }
}
