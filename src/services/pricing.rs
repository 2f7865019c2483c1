//! Servicio de cálculo de precios
//!
//! Este módulo concentra las dos reglas de duración del sistema y el cálculo
//! del importe esperado de una reserva. Las reglas son funciones nombradas y
//! separadas a propósito:
//!
//! - `pricing_duration_days`: regla canónica para facturar (días completos
//!   entre fechas, mínimo 1).
//! - `display_duration_days`: regla de presentación (incluye ambos extremos,
//!   `+1`), usada solo en las respuestas de la API.
//!
//! Nunca se deben mezclar: el importe siempre sale de la regla canónica.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::models::vehicle::{ListingType, Vehicle};
use crate::utils::errors::{AppError, AppResult};

/// Tolerancia aceptada frente al importe reportado por la pasarela de pago:
/// 2% del importe esperado, con suelo absoluto de 1 unidad
fn gateway_tolerance(expected: Decimal) -> Decimal {
    (expected * Decimal::new(2, 2)).max(Decimal::ONE)
}

/// Duración canónica de facturación: días completos entre inicio y fin,
/// con mínimo de 1 día
pub fn pricing_duration_days(start_date: NaiveDate, end_date: NaiveDate) -> i64 {
    let days = (end_date - start_date).num_days();
    days.max(1)
}

/// Duración de presentación: incluye ambos extremos del rango
pub fn display_duration_days(start_date: NaiveDate, end_date: NaiveDate) -> i64 {
    (end_date - start_date).num_days() + 1
}

/// Calcular el importe esperado de una reserva según el tipo de publicación.
///
/// Alquiler: tarifa diaria × duración canónica. Venta: precio fijo, las
/// fechas son irrelevantes.
pub fn expected_price(
    vehicle: &Vehicle,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
) -> AppResult<Decimal> {
    match vehicle.listing_type {
        ListingType::Rent => {
            let (start, end) = match (start_date, end_date) {
                (Some(s), Some(e)) => (s, e),
                _ => {
                    return Err(AppError::BadRequest(
                        "Las fechas de inicio y fin son requeridas para un alquiler".to_string(),
                    ))
                }
            };
            let daily_rate = vehicle.daily_rate.ok_or_else(|| {
                AppError::Internal(format!(
                    "Vehículo {} en alquiler sin tarifa diaria configurada",
                    vehicle.id
                ))
            })?;
            let days = pricing_duration_days(start, end);
            Ok(daily_rate * Decimal::from(days))
        }
        ListingType::Sale => vehicle.selling_price.ok_or_else(|| {
            AppError::Internal(format!(
                "Vehículo {} en venta sin precio configurado",
                vehicle.id
            ))
        }),
    }
}

/// Comparar el importe esperado con el reportado por la pasarela.
///
/// La pasarela es la fuente de verdad: una diferencia dentro de tolerancia
/// se acepta (redondeos de moneda); fuera de tolerancia se loguea pero no
/// bloquea la confirmación.
pub fn within_tolerance(expected: Decimal, actual: Decimal) -> bool {
    (expected - actual).abs() <= gateway_tolerance(expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    use crate::models::vehicle::VehicleStatus;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn rental_vehicle(daily_rate: i64) -> Vehicle {
        Vehicle {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            brand: Some("Toyota".to_string()),
            model: Some("Corolla".to_string()),
            listing_type: ListingType::Rent,
            daily_rate: Some(Decimal::from(daily_rate)),
            selling_price: None,
            status: VehicleStatus::Available,
            created_at: DateTime::<Utc>::MIN_UTC,
        }
    }

    fn sale_vehicle(selling_price: i64) -> Vehicle {
        Vehicle {
            listing_type: ListingType::Sale,
            daily_rate: None,
            selling_price: Some(Decimal::from(selling_price)),
            ..rental_vehicle(0)
        }
    }

    #[test]
    fn test_pricing_duration() {
        assert_eq!(pricing_duration_days(date("2024-01-01"), date("2024-01-03")), 2);
        assert_eq!(pricing_duration_days(date("2024-01-01"), date("2024-01-02")), 1);
        // Mismo día cuenta como un día facturable
        assert_eq!(pricing_duration_days(date("2024-01-01"), date("2024-01-01")), 1);
    }

    #[test]
    fn test_display_duration_includes_both_endpoints() {
        assert_eq!(display_duration_days(date("2024-01-01"), date("2024-01-03")), 3);
        assert_eq!(display_duration_days(date("2024-01-01"), date("2024-01-01")), 1);
    }

    #[test]
    fn test_rental_price() {
        let vehicle = rental_vehicle(50);
        let amount =
            expected_price(&vehicle, Some(date("2024-01-01")), Some(date("2024-01-04"))).unwrap();
        assert_eq!(amount, Decimal::from(150));
    }

    #[test]
    fn test_rental_price_requires_dates() {
        let vehicle = rental_vehicle(50);
        assert!(expected_price(&vehicle, None, None).is_err());
        assert!(expected_price(&vehicle, Some(date("2024-01-01")), None).is_err());
    }

    #[test]
    fn test_sale_price_ignores_dates() {
        let vehicle = sale_vehicle(20000);
        let amount = expected_price(&vehicle, None, None).unwrap();
        assert_eq!(amount, Decimal::from(20000));
    }

    #[test]
    fn test_gateway_tolerance() {
        // 295 sobre 300 esperados: dentro del 2%
        assert!(within_tolerance(Decimal::from(300), Decimal::from(295)));
        // diferencia exacta de tolerancia
        assert!(within_tolerance(Decimal::from(300), Decimal::from(306)));
        // fuera de tolerancia
        assert!(!within_tolerance(Decimal::from(300), Decimal::from(280)));
        // suelo absoluto para importes pequeños
        assert!(within_tolerance(Decimal::from(10), Decimal::from(9)));
        assert!(!within_tolerance(Decimal::from(10), Decimal::from(8)));
    }
}
