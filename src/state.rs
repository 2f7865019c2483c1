//! Shared application state
//!
//! Este módulo define el estado compartido de la aplicación que se pasa
//! a través del router de Axum.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::environment::EnvironmentConfig;
use crate::services::notifications::EventPublisher;
use crate::services::payment_gateway::PaymentGateway;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: EnvironmentConfig,
    pub gateway: Arc<dyn PaymentGateway>,
    pub events: EventPublisher,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: EnvironmentConfig,
        gateway: Arc<dyn PaymentGateway>,
        events: EventPublisher,
    ) -> Self {
        Self {
            pool,
            config,
            gateway,
            events,
        }
    }
}
