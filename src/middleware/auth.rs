//! Middleware de autenticación JWT
//!
//! La emisión de tokens vive en otro servicio del marketplace: aquí solo
//! se valida el Bearer token y se inyecta la identidad + rol en las
//! extensions del request.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::models::user::UserRole;
use crate::state::AppState;
use crate::utils::errors::AppError;
use crate::utils::jwt::verify_token;

/// Usuario autenticado que se inyecta en las requests
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub role: UserRole,
}

/// Middleware de autenticación JWT
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Extraer token del header Authorization
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|auth_str| auth_str.to_str().ok())
        .and_then(|auth_str| auth_str.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("Token de autorización requerido".to_string()))?;

    let claims = verify_token(auth_header, &state.config.jwt_secret)?;

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized("ID de usuario inválido".to_string()))?;

    let role: UserRole = claims
        .role
        .parse()
        .map_err(|_| AppError::Unauthorized("Rol desconocido en el token".to_string()))?;

    // Inyectar usuario autenticado en las extensions
    request
        .extensions_mut()
        .insert(AuthenticatedUser { user_id, role });

    Ok(next.run(request).await)
}
