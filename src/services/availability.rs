//! Servicio de disponibilidad de vehículos
//!
//! Decide si un rango de fechas solicitado choca con alguna reserva
//! existente del mismo vehículo. Solo las reservas en estado pending,
//! confirmed o active ocupan el calendario; las canceladas y completadas
//! nunca generan conflicto.
//!
//! El checker es una lectura pura sobre el repositorio. La re-verificación
//! definitiva ocurre dentro de la transacción de inserción, bajo el lock de
//! fila del vehículo, con el mismo predicado expresado en SQL.

use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::booking::Booking;
use crate::repositories::booking_repository::BookingRepository;
use crate::utils::errors::AppResult;

/// Test de solapamiento con extremos inclusivos.
///
/// Dos rangos `[s1, e1]` y `[s2, e2]` chocan si `s1 <= e2 && e1 >= s2`.
/// Equivale al triple OR de contención (inicio dentro, fin dentro, o rango
/// que contiene al existente) y debe mantenerse así.
pub fn ranges_overlap(s1: NaiveDate, e1: NaiveDate, s2: NaiveDate, e2: NaiveDate) -> bool {
    s1 <= e2 && e1 >= s2
}

/// ¿Alguna reserva ocupante del listado se solapa con el rango pedido?
///
/// Las reservas sin fechas (ventas) no ocupan calendario.
pub fn find_conflict(
    existing: &[Booking],
    start_date: NaiveDate,
    end_date: NaiveDate,
    exclude_booking_id: Option<Uuid>,
) -> bool {
    existing
        .iter()
        .filter(|booking| Some(booking.id) != exclude_booking_id)
        .filter(|booking| booking.status.occupies_calendar())
        .any(|booking| match (booking.start_date, booking.end_date) {
            (Some(s2), Some(e2)) => ranges_overlap(start_date, end_date, s2, e2),
            _ => false,
        })
}

/// Checker de disponibilidad sobre el repositorio de reservas
pub struct AvailabilityChecker<'a> {
    bookings: &'a BookingRepository,
}

impl<'a> AvailabilityChecker<'a> {
    pub fn new(bookings: &'a BookingRepository) -> Self {
        Self { bookings }
    }

    /// ¿Existe alguna reserva ocupante que se solape con el rango pedido?
    pub async fn has_conflict(
        &self,
        vehicle_id: Uuid,
        start_date: NaiveDate,
        end_date: NaiveDate,
        exclude_booking_id: Option<Uuid>,
    ) -> AppResult<bool> {
        let existing = self.bookings.find_by_vehicle(vehicle_id).await?;
        Ok(find_conflict(
            &existing,
            start_date,
            end_date,
            exclude_booking_id,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;

    use crate::models::booking::{BookingStatus, PaymentStatus};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn booking(start: &str, end: &str, status: BookingStatus) -> Booking {
        Booking {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            vehicle_id: Uuid::new_v4(),
            start_date: Some(date(start)),
            end_date: Some(date(end)),
            total_amount: Decimal::from(100),
            status,
            payment_status: PaymentStatus::Pending,
            payment_method: "card".to_string(),
            payment_transaction_id: None,
            pickup_location: None,
            created_at: DateTime::<Utc>::MIN_UTC,
            updated_at: DateTime::<Utc>::MIN_UTC,
        }
    }

    #[test]
    fn test_overlapping_ranges() {
        // nuevo inicio dentro del rango existente
        assert!(ranges_overlap(
            date("2024-01-02"),
            date("2024-01-04"),
            date("2024-01-01"),
            date("2024-01-03"),
        ));
        // nuevo fin dentro del rango existente
        assert!(ranges_overlap(
            date("2023-12-30"),
            date("2024-01-02"),
            date("2024-01-01"),
            date("2024-01-03"),
        ));
        // el nuevo rango contiene por completo al existente
        assert!(ranges_overlap(
            date("2023-12-30"),
            date("2024-01-10"),
            date("2024-01-01"),
            date("2024-01-03"),
        ));
    }

    #[test]
    fn test_touching_endpoints_conflict() {
        // Extremos inclusivos: compartir un día ya es conflicto
        assert!(ranges_overlap(
            date("2024-01-03"),
            date("2024-01-05"),
            date("2024-01-01"),
            date("2024-01-03"),
        ));
    }

    #[test]
    fn test_disjoint_ranges() {
        assert!(!ranges_overlap(
            date("2024-01-04"),
            date("2024-01-06"),
            date("2024-01-01"),
            date("2024-01-03"),
        ));
    }

    #[test]
    fn test_confirmed_booking_blocks_overlap() {
        let existing = vec![booking("2024-01-01", "2024-01-03", BookingStatus::Confirmed)];

        assert!(find_conflict(
            &existing,
            date("2024-01-02"),
            date("2024-01-04"),
            None
        ));
        assert!(!find_conflict(
            &existing,
            date("2024-01-04"),
            date("2024-01-06"),
            None
        ));
    }

    #[test]
    fn test_terminal_bookings_never_conflict() {
        let existing = vec![
            booking("2024-01-01", "2024-01-03", BookingStatus::Cancelled),
            booking("2024-01-01", "2024-01-03", BookingStatus::Completed),
        ];

        assert!(!find_conflict(
            &existing,
            date("2024-01-02"),
            date("2024-01-04"),
            None
        ));
    }

    #[test]
    fn test_exclude_booking_id() {
        let mut existing = vec![booking("2024-01-01", "2024-01-03", BookingStatus::Pending)];
        let own_id = existing[0].id;

        // La propia reserva no cuenta contra sí misma
        assert!(!find_conflict(
            &existing,
            date("2024-01-01"),
            date("2024-01-03"),
            Some(own_id)
        ));

        existing.push(booking("2024-01-02", "2024-01-05", BookingStatus::Active));
        assert!(find_conflict(
            &existing,
            date("2024-01-01"),
            date("2024-01-03"),
            Some(own_id)
        ));
    }

    #[test]
    fn test_sale_bookings_without_dates_ignored() {
        let mut sale = booking("2024-01-01", "2024-01-03", BookingStatus::Pending);
        sale.start_date = None;
        sale.end_date = None;

        assert!(!find_conflict(
            &[sale],
            date("2024-01-01"),
            date("2024-01-03"),
            None
        ));
    }
}
