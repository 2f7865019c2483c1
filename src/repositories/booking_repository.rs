//! Repositorio de reservas
//!
//! Persistencia de bookings y de las transiciones de estado. Las dos
//! escrituras críticas del sistema viven aquí:
//!
//! - `create_atomic`: re-verifica estado del vehículo y conflictos de
//!   calendario dentro de la misma transacción que inserta, con lock de
//!   fila sobre el vehículo (`SELECT ... FOR UPDATE`), de modo que dos
//!   creaciones concurrentes sobre el mismo vehículo se serializan.
//! - `update_status_atomic`: el cambio de estado del booking y el efecto
//!   sobre el estado del vehículo se confirman juntos o no se confirma
//!   ninguno.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::booking::{Booking, BookingStatus, PaymentStatus};
use crate::models::vehicle::{ListingType, Vehicle, VehicleStatus};
use crate::utils::errors::{AppError, AppResult};

/// Datos para insertar una reserva nueva
#[derive(Debug)]
pub struct NewBooking {
    pub customer_id: Uuid,
    pub vehicle_id: Uuid,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub total_amount: Decimal,
    pub payment_method: String,
    pub payment_transaction_id: Option<String>,
    pub pickup_location: Option<String>,
}

/// Proyección de reserva con vehículo, cliente y propietario unidos
#[derive(Debug, sqlx::FromRow)]
pub struct BookingDetailRow {
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
    pub listing_type: ListingType,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub daily_rate: Option<Decimal>,
    pub selling_price: Option<Decimal>,
    pub vehicle_status: VehicleStatus,
    pub owner_id: Uuid,
    pub customer_name: String,
    pub owner_name: String,
}

const DETAIL_SELECT: &str = r#"
    SELECT b.id, b.customer_id, b.vehicle_id, b.start_date, b.end_date,
           b.total_amount, b.status, b.payment_status, b.payment_method,
           b.payment_transaction_id, b.pickup_location, b.created_at, b.updated_at,
           v.listing_type, v.brand, v.model, v.daily_rate, v.selling_price,
           v.status AS vehicle_status, v.owner_id,
           c.full_name AS customer_name, o.full_name AS owner_name
    FROM bookings b
    JOIN vehicles v ON v.id = b.vehicle_id
    JOIN users c ON c.id = b.customer_id
    JOIN users o ON o.id = v.owner_id
"#;

pub struct BookingRepository {
    pool: PgPool,
}

impl BookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(booking)
    }

    pub async fn find_detail(&self, id: Uuid) -> AppResult<Option<BookingDetailRow>> {
        let query = format!("{} WHERE b.id = $1", DETAIL_SELECT);
        let detail = sqlx::query_as::<_, BookingDetailRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(detail)
    }

    pub async fn find_by_customer(&self, customer_id: Uuid) -> AppResult<Vec<BookingDetailRow>> {
        let query = format!(
            "{} WHERE b.customer_id = $1 ORDER BY b.created_at DESC",
            DETAIL_SELECT
        );
        let bookings = sqlx::query_as::<_, BookingDetailRow>(&query)
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(bookings)
    }

    pub async fn find_by_owner(&self, owner_id: Uuid) -> AppResult<Vec<BookingDetailRow>> {
        let query = format!(
            "{} WHERE v.owner_id = $1 ORDER BY b.created_at DESC",
            DETAIL_SELECT
        );
        let bookings = sqlx::query_as::<_, BookingDetailRow>(&query)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(bookings)
    }

    /// Todas las reservas de un vehículo; el checker de disponibilidad
    /// decide cuáles ocupan calendario
    pub async fn find_by_vehicle(&self, vehicle_id: Uuid) -> AppResult<Vec<Booking>> {
        let bookings = sqlx::query_as::<_, Booking>(
            "SELECT * FROM bookings WHERE vehicle_id = $1 ORDER BY start_date",
        )
        .bind(vehicle_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(bookings)
    }

    /// Insertar una reserva con verificación de disponibilidad dentro de la
    /// misma transacción.
    ///
    /// El lock de fila sobre el vehículo serializa a los escritores
    /// concurrentes: el segundo ve el estado ya cambiado o el booking ya
    /// insertado por el primero.
    pub async fn create_atomic(&self, new_booking: NewBooking) -> AppResult<Booking> {
        let mut tx = self.pool.begin().await?;

        let vehicle = sqlx::query_as::<_, Vehicle>(
            "SELECT * FROM vehicles WHERE id = $1 FOR UPDATE",
        )
        .bind(new_booking.vehicle_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Vehículo no encontrado".to_string()))?;

        if vehicle.status != VehicleStatus::Available {
            return Err(AppError::InvalidState(
                "El vehículo ya no está disponible".to_string(),
            ));
        }

        // Re-verificación de conflicto bajo el lock (solo alquileres)
        if vehicle.listing_type == ListingType::Rent {
            let (start, end) = match (new_booking.start_date, new_booking.end_date) {
                (Some(s), Some(e)) => (s, e),
                _ => {
                    return Err(AppError::BadRequest(
                        "Las fechas son requeridas para un alquiler".to_string(),
                    ))
                }
            };

            let conflict: (bool,) = sqlx::query_as(
                r#"
                SELECT EXISTS(
                    SELECT 1 FROM bookings
                    WHERE vehicle_id = $1
                      AND status IN ('pending', 'confirmed', 'active')
                      AND start_date IS NOT NULL AND end_date IS NOT NULL
                      AND start_date <= $3 AND end_date >= $2
                )
                "#,
            )
            .bind(new_booking.vehicle_id)
            .bind(start)
            .bind(end)
            .fetch_one(&mut *tx)
            .await?;

            if conflict.0 {
                return Err(AppError::Conflict(
                    "El vehículo ya tiene una reserva en esas fechas".to_string(),
                ));
            }
        } else {
            // Una venta solo admite una reserva viva a la vez: el segundo
            // comprador concurrente falla aquí, bajo el mismo lock
            let occupied: (bool,) = sqlx::query_as(
                r#"
                SELECT EXISTS(
                    SELECT 1 FROM bookings
                    WHERE vehicle_id = $1
                      AND status IN ('pending', 'confirmed', 'active')
                )
                "#,
            )
            .bind(new_booking.vehicle_id)
            .fetch_one(&mut *tx)
            .await?;

            if occupied.0 {
                return Err(AppError::InvalidState(
                    "El vehículo ya no está disponible".to_string(),
                ));
            }
        }

        let now = Utc::now();
        let booking = sqlx::query_as::<_, Booking>(
            r#"
            INSERT INTO bookings (id, customer_id, vehicle_id, start_date, end_date,
                                  total_amount, status, payment_status, payment_method,
                                  payment_transaction_id, pickup_location, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new_booking.customer_id)
        .bind(new_booking.vehicle_id)
        .bind(new_booking.start_date)
        .bind(new_booking.end_date)
        .bind(new_booking.total_amount)
        .bind(BookingStatus::Pending)
        .bind(PaymentStatus::Pending)
        .bind(&new_booking.payment_method)
        .bind(&new_booking.payment_transaction_id)
        .bind(&new_booking.pickup_location)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(booking)
    }

    /// Aplicar el cambio de estado del booking y el efecto sobre el vehículo
    /// como una sola unidad de trabajo.
    ///
    /// Si cualquiera de las dos escrituras falla, la transacción se revierte
    /// y el llamador puede asumir que no hubo ningún cambio.
    pub async fn update_status_atomic(
        &self,
        booking_id: Uuid,
        new_status: BookingStatus,
        vehicle_effect: Option<(Uuid, VehicleStatus)>,
        payment: Option<(PaymentStatus, String)>,
    ) -> AppResult<Booking> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let booking = match payment {
            Some((payment_status, transaction_id)) => {
                sqlx::query_as::<_, Booking>(
                    r#"
                    UPDATE bookings
                    SET status = $2, payment_status = $3, payment_transaction_id = $4, updated_at = $5
                    WHERE id = $1
                    RETURNING *
                    "#,
                )
                .bind(booking_id)
                .bind(new_status)
                .bind(payment_status)
                .bind(transaction_id)
                .bind(now)
                .fetch_optional(&mut *tx)
                .await?
            }
            None => {
                sqlx::query_as::<_, Booking>(
                    "UPDATE bookings SET status = $2, updated_at = $3 WHERE id = $1 RETURNING *",
                )
                .bind(booking_id)
                .bind(new_status)
                .bind(now)
                .fetch_optional(&mut *tx)
                .await?
            }
        };

        let booking = booking
            .ok_or_else(|| AppError::NotFound("Reserva no encontrada".to_string()))?;

        if let Some((vehicle_id, vehicle_status)) = vehicle_effect {
            let result = sqlx::query("UPDATE vehicles SET status = $2 WHERE id = $1")
                .bind(vehicle_id)
                .bind(vehicle_status)
                .execute(&mut *tx)
                .await?;

            if result.rows_affected() != 1 {
                // El drop de la transacción revierte el update del booking
                return Err(AppError::Internal(format!(
                    "No se pudo sincronizar el estado del vehículo {}",
                    vehicle_id
                )));
            }
        }

        tx.commit().await?;

        Ok(booking)
    }

    /// Registrar un pago manual: método, referencia y payment_status=paid.
    /// El estado de la reserva no cambia aquí.
    ///
    /// El predicado `payment_status <> 'paid'` hace la escritura idempotente
    /// también bajo concurrencia: de dos registros simultáneos solo uno
    /// actualiza la fila, el otro falla `AlreadyPaid`.
    pub async fn record_payment(
        &self,
        booking_id: Uuid,
        payment_method: String,
        transaction_id: String,
    ) -> AppResult<Booking> {
        let booking = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings
            SET payment_method = $2, payment_transaction_id = $3, payment_status = $4, updated_at = $5
            WHERE id = $1 AND payment_status <> 'paid'
            RETURNING *
            "#,
        )
        .bind(booking_id)
        .bind(payment_method)
        .bind(transaction_id)
        .bind(PaymentStatus::Paid)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        match booking {
            Some(booking) => Ok(booking),
            // Cero filas: o la reserva no existe o ya estaba pagada
            None => match self.find_by_id(booking_id).await? {
                Some(_) => Err(AppError::AlreadyPaid(
                    "La reserva ya tiene un pago registrado".to_string(),
                )),
                None => Err(AppError::NotFound("Reserva no encontrada".to_string())),
            },
        }
    }

    /// Limpieza de mantenimiento: borrar reservas canceladas antiguas.
    ///
    /// Única vía de borrado físico de bookings en todo el sistema.
    pub async fn delete_cancelled_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            "DELETE FROM bookings WHERE status = 'cancelled' AND updated_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
