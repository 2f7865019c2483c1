//! Controller del ciclo de vida de reservas
//!
//! Dueño de la máquina de estados de bookings y de los efectos pareados
//! sobre el estado del vehículo. Todas las mutaciones de estado del
//! calendario pasan por aquí; ningún otro componente escribe el estado de
//! un vehículo por su cuenta.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::Rng;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::dto::booking_dto::{
    BookingResponse, CreateBookingRequest, RecordPaymentRequest, UpdateBookingStatusRequest,
    VerifyPaymentRequest,
};
use crate::dto::common::ApiResponse;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::booking::{BookingStatus, PaymentStatus};
use crate::models::user::UserRole;
use crate::models::vehicle::{ListingType, VehicleStatus};
use crate::repositories::booking_repository::{BookingRepository, NewBooking};
use crate::repositories::vehicle_repository::VehicleRepository;
use crate::services::availability::AvailabilityChecker;
use crate::services::notifications::{DomainEvent, EventPublisher};
use crate::services::payment_gateway::PaymentGateway;
use crate::services::pricing;
use crate::utils::errors::{AppError, AppResult};

/// Efecto sobre el estado del vehículo al entrar el booking en `new_status`.
///
/// - activa → vehículo alquilado
/// - completada → vendido si era venta, disponible si era alquiler
/// - cancelada → disponible
fn vehicle_status_after(
    new_status: BookingStatus,
    listing_type: ListingType,
) -> Option<VehicleStatus> {
    match new_status {
        BookingStatus::Active => Some(VehicleStatus::Rented),
        BookingStatus::Completed => Some(match listing_type {
            ListingType::Sale => VehicleStatus::Sold,
            ListingType::Rent => VehicleStatus::Available,
        }),
        BookingStatus::Cancelled => Some(VehicleStatus::Available),
        _ => None,
    }
}

/// Autorizar una transición según el rol del actor y su relación con la
/// reserva.
///
/// | Actor                    | Destinos permitidos    | Desde               |
/// |--------------------------|------------------------|---------------------|
/// | admin                    | cualquiera             | cualquiera          |
/// | propietario del vehículo | confirmed, cancelled   | pending, confirmed  |
/// | cliente de la reserva    | cancelled              | pending, confirmed  |
///
/// `Forbidden` cuando el actor no puede pedir ese destino; `InvalidState`
/// cuando el destino es suyo pero la transición no es legal desde `from`.
fn authorize_transition(
    actor: &AuthenticatedUser,
    customer_id: Uuid,
    owner_id: Uuid,
    from: BookingStatus,
    to: BookingStatus,
) -> AppResult<()> {
    if actor.role == UserRole::Admin {
        return Ok(());
    }

    let allowed_target = match actor.role {
        UserRole::Owner if actor.user_id == owner_id => {
            matches!(to, BookingStatus::Confirmed | BookingStatus::Cancelled)
        }
        UserRole::Customer if actor.user_id == customer_id => to == BookingStatus::Cancelled,
        _ => false,
    };

    if !allowed_target {
        return Err(AppError::Forbidden(
            "No tienes permiso para aplicar esta transición".to_string(),
        ));
    }

    if !matches!(from, BookingStatus::Pending | BookingStatus::Confirmed)
        || !from.can_transition_to(to)
    {
        return Err(AppError::InvalidState(format!(
            "Transición ilegal de '{}' a '{}'",
            from.as_str(),
            to.as_str()
        )));
    }

    Ok(())
}

/// ¿Admite esta reserva una verificación de pago?
///
/// Una reserva ya pagada falla `AlreadyPaid`; una reserva terminal o que no
/// puede transicionar a confirmed falla `InvalidState`. Sin este guard una
/// reserva cancelada podría resucitar y pisar el estado del vehículo.
fn ensure_payment_verifiable(
    status: BookingStatus,
    payment_status: PaymentStatus,
) -> AppResult<()> {
    if payment_status == PaymentStatus::Paid {
        return Err(AppError::AlreadyPaid(
            "La reserva ya tiene un pago verificado".to_string(),
        ));
    }

    if status.is_terminal() {
        return Err(AppError::InvalidState(format!(
            "La reserva en estado '{}' ya no admite pagos",
            status.as_str()
        )));
    }

    if !status.can_transition_to(BookingStatus::Confirmed) {
        return Err(AppError::InvalidState(format!(
            "No se puede confirmar una reserva en estado '{}'",
            status.as_str()
        )));
    }

    Ok(())
}

/// Generar una referencia de transacción para la pasarela
fn generate_transaction_reference() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    format!("RB-{}", suffix.to_uppercase())
}

pub struct BookingController {
    bookings: BookingRepository,
    vehicles: VehicleRepository,
    events: EventPublisher,
    gateway: Arc<dyn PaymentGateway>,
}

impl BookingController {
    pub fn new(pool: PgPool, events: EventPublisher, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            bookings: BookingRepository::new(pool.clone()),
            vehicles: VehicleRepository::new(pool),
            events,
            gateway,
        }
    }

    /// Crear una reserva nueva en estado pending/pending
    pub async fn create(
        &self,
        actor: &AuthenticatedUser,
        request: CreateBookingRequest,
    ) -> AppResult<ApiResponse<BookingResponse>> {
        request.validate()?;

        let vehicle = self
            .vehicles
            .find_by_id(request.vehicle_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Vehículo no encontrado".to_string()))?;

        if !vehicle.is_available() {
            return Err(AppError::InvalidState(
                "El vehículo no está disponible".to_string(),
            ));
        }

        // Validación de fechas y conflicto: solo alquileres. Una venta no
        // tiene calendario que defender.
        if !vehicle.is_for_sale() {
            let (start, end) = match (request.start_date, request.end_date) {
                (Some(s), Some(e)) => (s, e),
                _ => {
                    return Err(AppError::BadRequest(
                        "Las fechas de inicio y fin son requeridas para un alquiler".to_string(),
                    ))
                }
            };

            let today = Utc::now().date_naive();
            if start < today {
                return Err(AppError::BadRequest(
                    "La fecha de recogida no puede estar en el pasado".to_string(),
                ));
            }
            if end <= start {
                return Err(AppError::BadRequest(
                    "La fecha de devolución debe ser posterior a la de recogida".to_string(),
                ));
            }

            let checker = AvailabilityChecker::new(&self.bookings);
            if checker
                .has_conflict(vehicle.id, start, end, None)
                .await?
            {
                return Err(AppError::Conflict(
                    "El vehículo ya tiene una reserva en esas fechas".to_string(),
                ));
            }
        }

        let expected = pricing::expected_price(&vehicle, request.start_date, request.end_date)?;

        // El precio del cliente no bloquea: la pasarela es la fuente de
        // verdad. Las discrepancias grandes quedan registradas.
        if let Some(client_price) = request.total_price {
            if !pricing::within_tolerance(expected, client_price) {
                warn!(
                    "⚠️ Precio del cliente {} difiere del esperado {} para vehículo {}",
                    client_price, expected, vehicle.id
                );
            }
        }

        let transaction_ref = generate_transaction_reference();

        let booking = self
            .bookings
            .create_atomic(NewBooking {
                customer_id: actor.user_id,
                vehicle_id: vehicle.id,
                start_date: request.start_date,
                end_date: request.end_date,
                total_amount: expected,
                payment_method: request.payment_method,
                payment_transaction_id: Some(transaction_ref),
                pickup_location: request.pickup_location,
            })
            .await?;

        // Fire-and-forget: un fallo aquí jamás revierte la creación
        self.events.publish(DomainEvent::BookingCreated {
            booking_id: booking.id,
            customer_id: booking.customer_id,
            vehicle_id: booking.vehicle_id,
            owner_id: vehicle.owner_id,
            total_amount: booking.total_amount,
        });

        info!("✅ Reserva {} creada para vehículo {}", booking.id, vehicle.id);

        let detail = self
            .bookings
            .find_detail(booking.id)
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!("Reserva {} recién creada no encontrada", booking.id))
            })?;

        Ok(ApiResponse::success_with_message(
            detail.into(),
            "Reserva creada exitosamente".to_string(),
        ))
    }

    /// Obtener una reserva con su proyección completa
    pub async fn get_by_id(
        &self,
        id: Uuid,
        actor: &AuthenticatedUser,
    ) -> AppResult<BookingResponse> {
        let detail = self
            .bookings
            .find_detail(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Reserva no encontrada".to_string()))?;

        let is_party = actor.user_id == detail.customer_id || actor.user_id == detail.owner_id;
        if actor.role != UserRole::Admin && !is_party {
            return Err(AppError::Forbidden(
                "No tienes permiso para acceder a esta reserva".to_string(),
            ));
        }

        Ok(detail.into())
    }

    /// Reservas del cliente autenticado
    pub async fn list_for_customer(
        &self,
        actor: &AuthenticatedUser,
    ) -> AppResult<Vec<BookingResponse>> {
        let rows = self.bookings.find_by_customer(actor.user_id).await?;
        Ok(rows.into_iter().map(BookingResponse::from).collect())
    }

    /// Reservas sobre los vehículos del propietario autenticado
    pub async fn list_for_owner(
        &self,
        actor: &AuthenticatedUser,
    ) -> AppResult<Vec<BookingResponse>> {
        let rows = self.bookings.find_by_owner(actor.user_id).await?;
        Ok(rows.into_iter().map(BookingResponse::from).collect())
    }

    /// Transicionar el estado de una reserva con su efecto sobre el vehículo
    pub async fn update_status(
        &self,
        id: Uuid,
        actor: &AuthenticatedUser,
        request: UpdateBookingStatusRequest,
    ) -> AppResult<ApiResponse<BookingResponse>> {
        let detail = self
            .bookings
            .find_detail(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Reserva no encontrada".to_string()))?;

        let previous_status = detail.status;
        let new_status = request.status;

        authorize_transition(
            actor,
            detail.customer_id,
            detail.owner_id,
            previous_status,
            new_status,
        )?;

        let effect = vehicle_status_after(new_status, detail.listing_type)
            .map(|status| (detail.vehicle_id, status));

        self.bookings
            .update_status_atomic(id, new_status, effect, None)
            .await?;

        self.events.publish(DomainEvent::BookingStatusChanged {
            booking_id: id,
            customer_id: detail.customer_id,
            owner_id: detail.owner_id,
            previous_status,
            new_status,
        });

        info!(
            "🔄 Reserva {} transicionada de '{}' a '{}'",
            id,
            previous_status.as_str(),
            new_status.as_str()
        );

        let updated = self
            .bookings
            .find_detail(id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Reserva {} no encontrada tras actualizar", id)))?;

        Ok(ApiResponse::success_with_message(
            updated.into(),
            "Estado actualizado exitosamente".to_string(),
        ))
    }

    /// Cancelar una reserva en pending o confirmed
    pub async fn cancel(
        &self,
        id: Uuid,
        actor: &AuthenticatedUser,
    ) -> AppResult<ApiResponse<BookingResponse>> {
        let detail = self
            .bookings
            .find_detail(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Reserva no encontrada".to_string()))?;

        if !matches!(
            detail.status,
            BookingStatus::Pending | BookingStatus::Confirmed
        ) {
            return Err(AppError::InvalidState(format!(
                "No se puede cancelar una reserva en estado '{}'",
                detail.status.as_str()
            )));
        }

        let is_party = actor.user_id == detail.customer_id || actor.user_id == detail.owner_id;
        if actor.role != UserRole::Admin && !is_party {
            return Err(AppError::Forbidden(
                "No tienes permiso para cancelar esta reserva".to_string(),
            ));
        }

        // Solo una reserva confirmada retenía el vehículo; una pending
        // nunca lo sacó de 'available'
        let effect = if detail.status == BookingStatus::Confirmed {
            Some((detail.vehicle_id, VehicleStatus::Available))
        } else {
            None
        };

        self.bookings
            .update_status_atomic(id, BookingStatus::Cancelled, effect, None)
            .await?;

        self.events.publish(DomainEvent::BookingStatusChanged {
            booking_id: id,
            customer_id: detail.customer_id,
            owner_id: detail.owner_id,
            previous_status: detail.status,
            new_status: BookingStatus::Cancelled,
        });

        let updated = self
            .bookings
            .find_detail(id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Reserva {} no encontrada tras cancelar", id)))?;

        Ok(ApiResponse::success_with_message(
            updated.into(),
            "Reserva cancelada exitosamente".to_string(),
        ))
    }

    /// Registrar un pago manual (efectivo, transferencia) sobre la reserva.
    ///
    /// Marca payment_status=paid pero no transiciona el estado: confirmar
    /// sigue siendo decisión del propietario o de la verificación de
    /// pasarela. Idempotencia: un segundo intento sobre una reserva ya
    /// pagada falla AlreadyPaid sin tocar nada.
    pub async fn record_payment(
        &self,
        id: Uuid,
        actor: &AuthenticatedUser,
        request: RecordPaymentRequest,
    ) -> AppResult<ApiResponse<BookingResponse>> {
        request.validate()?;

        let booking = self
            .bookings
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Reserva no encontrada".to_string()))?;

        if actor.role != UserRole::Admin && actor.user_id != booking.customer_id {
            return Err(AppError::Forbidden(
                "Solo el cliente de la reserva puede registrar el pago".to_string(),
            ));
        }

        if booking.payment_status == PaymentStatus::Paid {
            return Err(AppError::AlreadyPaid(
                "La reserva ya tiene un pago registrado".to_string(),
            ));
        }

        self.bookings
            .record_payment(id, request.payment_method, request.payment_transaction_id)
            .await?;

        let detail = self
            .bookings
            .find_detail(id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Reserva {} no encontrada tras registrar pago", id)))?;

        Ok(ApiResponse::success_with_message(
            detail.into(),
            "Pago registrado exitosamente".to_string(),
        ))
    }

    /// Verificar el pago contra la pasarela y confirmar la reserva.
    ///
    /// La verificación ocurre ANTES de abrir la transacción local: la
    /// latencia de la pasarela nunca retiene locks sobre el vehículo.
    pub async fn verify_payment(
        &self,
        id: Uuid,
        request: VerifyPaymentRequest,
    ) -> AppResult<ApiResponse<BookingResponse>> {
        request.validate()?;

        let detail = self
            .bookings
            .find_detail(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Reserva no encontrada".to_string()))?;

        ensure_payment_verifiable(detail.status, detail.payment_status)?;

        let verification = self
            .gateway
            .verify_transaction(&request.transaction_ref)
            .await?;

        if !verification.is_successful() {
            return Err(AppError::PaymentVerificationFailed(format!(
                "La pasarela reportó estado '{}' para la referencia '{}'",
                verification.status, request.transaction_ref
            )));
        }

        // El importe de la pasarela manda; la diferencia solo se registra
        if verification.amount_paid != detail.total_amount {
            if pricing::within_tolerance(detail.total_amount, verification.amount_paid) {
                info!(
                    "💱 Redondeo de pasarela en reserva {}: esperado {}, pagado {}",
                    id, detail.total_amount, verification.amount_paid
                );
            } else {
                warn!(
                    "⚠️ Importe de pasarela fuera de tolerancia en reserva {}: esperado {}, pagado {} {}",
                    id, detail.total_amount, verification.amount_paid, verification.currency
                );
            }
        }

        let vehicle_status = match detail.listing_type {
            ListingType::Sale => VehicleStatus::Sold,
            ListingType::Rent => VehicleStatus::Rented,
        };

        self.bookings
            .update_status_atomic(
                id,
                BookingStatus::Confirmed,
                Some((detail.vehicle_id, vehicle_status)),
                Some((PaymentStatus::Paid, request.transaction_ref.clone())),
            )
            .await?;

        self.events.publish(DomainEvent::PaymentVerified {
            booking_id: id,
            customer_id: detail.customer_id,
            owner_id: detail.owner_id,
            transaction_ref: request.transaction_ref,
            amount_paid: verification.amount_paid,
        });

        info!("💰 Pago verificado para reserva {}", id);

        let updated = self
            .bookings
            .find_detail(id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Reserva {} no encontrada tras verificar", id)))?;

        Ok(ApiResponse::success_with_message(
            updated.into(),
            "Pago verificado y reserva confirmada".to_string(),
        ))
    }

    /// Limpieza de mantenimiento de reservas canceladas antiguas (solo admin)
    pub async fn cleanup_cancelled(
        &self,
        actor: &AuthenticatedUser,
        older_than_days: Option<i64>,
    ) -> AppResult<u64> {
        if actor.role != UserRole::Admin {
            return Err(AppError::Forbidden(
                "Solo un administrador puede ejecutar la limpieza".to_string(),
            ));
        }

        let days = older_than_days.unwrap_or(365);
        let cutoff = Utc::now() - Duration::days(days);
        let deleted = self.bookings.delete_cancelled_before(cutoff).await?;

        info!("🧹 Limpieza de reservas canceladas: {} eliminadas", deleted);

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: UserRole, user_id: Uuid) -> AuthenticatedUser {
        AuthenticatedUser { user_id, role }
    }

    #[test]
    fn test_admin_overrides_everything() {
        let admin = actor(UserRole::Admin, Uuid::new_v4());
        let customer = Uuid::new_v4();
        let owner = Uuid::new_v4();

        // Incluso transiciones ilegales para otros roles
        assert!(authorize_transition(
            &admin,
            customer,
            owner,
            BookingStatus::Completed,
            BookingStatus::Active
        )
        .is_ok());
    }

    #[test]
    fn test_owner_confirms_pending() {
        let owner_id = Uuid::new_v4();
        let owner = actor(UserRole::Owner, owner_id);

        assert!(authorize_transition(
            &owner,
            Uuid::new_v4(),
            owner_id,
            BookingStatus::Pending,
            BookingStatus::Confirmed
        )
        .is_ok());
    }

    #[test]
    fn test_owner_of_other_vehicle_forbidden() {
        let owner = actor(UserRole::Owner, Uuid::new_v4());

        let result = authorize_transition(
            &owner,
            Uuid::new_v4(),
            Uuid::new_v4(), // otro propietario
            BookingStatus::Pending,
            BookingStatus::Confirmed,
        );
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[test]
    fn test_customer_can_only_cancel() {
        let customer_id = Uuid::new_v4();
        let customer = actor(UserRole::Customer, customer_id);
        let owner_id = Uuid::new_v4();

        assert!(authorize_transition(
            &customer,
            customer_id,
            owner_id,
            BookingStatus::Confirmed,
            BookingStatus::Cancelled
        )
        .is_ok());

        let result = authorize_transition(
            &customer,
            customer_id,
            owner_id,
            BookingStatus::Pending,
            BookingStatus::Confirmed,
        );
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[test]
    fn test_terminal_state_rejected_for_non_admin() {
        let customer_id = Uuid::new_v4();
        let customer = actor(UserRole::Customer, customer_id);

        let result = authorize_transition(
            &customer,
            customer_id,
            Uuid::new_v4(),
            BookingStatus::Completed,
            BookingStatus::Cancelled,
        );
        assert!(matches!(result, Err(AppError::InvalidState(_))));
    }

    #[test]
    fn test_vehicle_side_effects() {
        assert_eq!(
            vehicle_status_after(BookingStatus::Active, ListingType::Rent),
            Some(VehicleStatus::Rented)
        );
        assert_eq!(
            vehicle_status_after(BookingStatus::Completed, ListingType::Rent),
            Some(VehicleStatus::Available)
        );
        // Una venta completada jamás vuelve a 'available'
        assert_eq!(
            vehicle_status_after(BookingStatus::Completed, ListingType::Sale),
            Some(VehicleStatus::Sold)
        );
        assert_eq!(
            vehicle_status_after(BookingStatus::Cancelled, ListingType::Rent),
            Some(VehicleStatus::Available)
        );
        assert_eq!(
            vehicle_status_after(BookingStatus::Confirmed, ListingType::Rent),
            None
        );
    }

    #[test]
    fn test_verify_allowed_only_from_pending() {
        assert!(ensure_payment_verifiable(BookingStatus::Pending, PaymentStatus::Pending).is_ok());

        // Ya confirmada o activa: la verificación no aplica
        assert!(matches!(
            ensure_payment_verifiable(BookingStatus::Confirmed, PaymentStatus::Pending),
            Err(AppError::InvalidState(_))
        ));
        assert!(matches!(
            ensure_payment_verifiable(BookingStatus::Active, PaymentStatus::Pending),
            Err(AppError::InvalidState(_))
        ));
    }

    #[test]
    fn test_verify_never_resurrects_terminal_booking() {
        // Una reserva cancelada no vuelve a confirmed ni toca el vehículo
        assert!(matches!(
            ensure_payment_verifiable(BookingStatus::Cancelled, PaymentStatus::Pending),
            Err(AppError::InvalidState(_))
        ));
        assert!(matches!(
            ensure_payment_verifiable(BookingStatus::Completed, PaymentStatus::Pending),
            Err(AppError::InvalidState(_))
        ));
    }

    #[test]
    fn test_verify_rejects_already_paid() {
        assert!(matches!(
            ensure_payment_verifiable(BookingStatus::Pending, PaymentStatus::Paid),
            Err(AppError::AlreadyPaid(_))
        ));
    }

    #[test]
    fn test_transaction_reference_format() {
        let reference = generate_transaction_reference();
        assert!(reference.starts_with("RB-"));
        assert_eq!(reference.len(), 15);
    }
}
