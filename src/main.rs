mod config;
mod controllers;
mod database;
mod dto;
mod middleware;
mod models;
mod repositories;
mod routes;
mod services;
mod state;
mod utils;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{response::Json, routing::get, Router};
use dotenvy::dotenv;
use serde_json::json;
use tokio::signal;
use tracing::{error, info};

use config::environment::EnvironmentConfig;
use database::DatabaseConnection;
use middleware::cors::{cors_middleware, cors_middleware_with_origins};
use services::notifications::{spawn_dispatcher, LogNotifier};
use services::payment_gateway::HttpPaymentGateway;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Cargar variables de entorno
    dotenv().ok();

    let config = EnvironmentConfig::default();

    // Configurar logging
    let log_level = if config.is_production() {
        tracing::Level::INFO
    } else {
        tracing::Level::DEBUG
    };
    tracing_subscriber::fmt().with_max_level(log_level).init();

    info!("🚗 Rental Marketplace - API de reservas");
    info!("=======================================");

    // Inicializar base de datos
    let db_connection = match DatabaseConnection::new_default().await {
        Ok(conn) => conn,
        Err(e) => {
            error!("❌ Error conectando a la base de datos: {}", e);
            return Err(anyhow::anyhow!("Error de base de datos: {}", e));
        }
    };

    let pool = db_connection.pool().clone();

    // Pasarela de pago
    let gateway = Arc::new(HttpPaymentGateway::new(
        config.payment_gateway_url.clone(),
        config.payment_gateway_api_key.clone(),
    ));

    // Dispatcher de notificaciones en background
    let events = spawn_dispatcher(Arc::new(LogNotifier));

    // CORS: permisivo en desarrollo, orígenes explícitos en producción
    let cors = if config.is_development() || config.cors_origins.is_empty() {
        cors_middleware()
    } else {
        cors_middleware_with_origins(config.cors_origins.clone())
    };

    // Crear router de la API
    let app_state = AppState::new(pool, config.clone(), gateway, events);

    let app = Router::new()
        .route("/health", get(health_endpoint))
        .nest(
            "/api/booking",
            routes::booking_routes::create_booking_router(app_state.clone()),
        )
        .nest(
            "/api/vehicle",
            routes::vehicle_routes::create_vehicle_router(app_state.clone()),
        )
        .layer(cors)
        .with_state(app_state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    info!("🌐 Servidor iniciando en http://{}", addr);
    info!("🔍 Endpoints disponibles:");
    info!("   GET  /health - Health check");
    info!("📅 Endpoints - Booking:");
    info!("   POST   /api/booking - Crear reserva");
    info!("   GET    /api/booking/me - Mis reservas (cliente)");
    info!("   GET    /api/booking/owner - Reservas de mis vehículos");
    info!("   GET    /api/booking/:id - Obtener reserva");
    info!("   PATCH  /api/booking/:id/status - Transicionar estado");
    info!("   POST   /api/booking/:id/cancel - Cancelar reserva");
    info!("   POST   /api/booking/:id/payment - Registrar pago");
    info!("   POST   /api/booking/:id/verify-payment - Verificar pago");
    info!("   DELETE /api/booking/maintenance/cancelled - Limpieza (admin)");
    info!("🚙 Endpoints - Vehicle:");
    info!("   GET  /api/vehicle - Vehículos disponibles");
    info!("   GET  /api/vehicle/mine - Mis vehículos (propietario)");
    info!("   GET  /api/vehicle/:id - Obtener vehículo");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!("❌ Error del servidor: {}", e);
            anyhow::anyhow!(e)
        })?;

    info!("👋 Servidor terminado");
    Ok(())
}

/// Health check simple
async fn health_endpoint() -> Json<serde_json::Value> {
    Json(json!({
        "service": "rental-marketplace",
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Señal de apagado graceful
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("🛑 Señal Ctrl+C recibida, apagando servidor...");
        },
        _ = terminate => {
            info!("🛑 Señal de terminación recibida, apagando servidor...");
        },
    }
}
