//! Controller de vehículos (lecturas)
//!
//! Los flujos de reserva solo necesitan consultar vehículos; las
//! escrituras de estado van siempre por el ciclo de vida de bookings.

use sqlx::PgPool;
use uuid::Uuid;

use crate::dto::vehicle_dto::VehicleResponse;
use crate::middleware::auth::AuthenticatedUser;
use crate::repositories::vehicle_repository::VehicleRepository;
use crate::utils::errors::{AppError, AppResult};

pub struct VehicleController {
    repository: VehicleRepository,
}

impl VehicleController {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: VehicleRepository::new(pool),
        }
    }

    pub async fn get_by_id(&self, id: Uuid) -> AppResult<VehicleResponse> {
        let vehicle = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Vehículo no encontrado".to_string()))?;

        Ok(vehicle.into())
    }

    pub async fn list_available(&self) -> AppResult<Vec<VehicleResponse>> {
        let vehicles = self.repository.list_available().await?;
        Ok(vehicles.into_iter().map(VehicleResponse::from).collect())
    }

    pub async fn list_mine(&self, actor: &AuthenticatedUser) -> AppResult<Vec<VehicleResponse>> {
        let vehicles = self.repository.list_by_owner(actor.user_id).await?;
        Ok(vehicles.into_iter().map(VehicleResponse::from).collect())
    }
}
