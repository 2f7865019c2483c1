//! Utilidades JWT Simplificadas
//!
//! Este módulo contiene funciones helper para manejo de JWT tokens simplificados.
//! El backend no emite tokens de login (eso vive en otro servicio del
//! marketplace); solo los valida y extrae identidad + rol.

use jsonwebtoken::{decode, DecodingKey, Validation};
#[cfg(test)]
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
#[cfg(test)]
use uuid::Uuid;

use crate::utils::errors::AppError;

/// Claims del JWT token simplificado
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,  // user_id
    pub role: String, // customer | owner | admin
    pub exp: usize,   // expiration timestamp
    pub iat: usize,   // issued at timestamp
}

/// Generar JWT token para un usuario. La emisión real vive en el servicio
/// de login; esto existe solo para fabricar tokens en tests.
#[cfg(test)]
pub fn generate_token(
    user_id: Uuid,
    role: &str,
    secret: &str,
    expiration_secs: u64,
) -> Result<String, AppError> {
    let now = chrono::Utc::now();
    let expires_at = now + chrono::Duration::seconds(expiration_secs as i64);

    let claims = JwtClaims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: expires_at.timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    let encoding_key = EncodingKey::from_secret(secret.as_ref());

    encode(&Header::default(), &claims, &encoding_key)
        .map_err(|e| AppError::Jwt(format!("Error generando token: {}", e)))
}

/// Verificar y decodificar JWT token
pub fn verify_token(token: &str, secret: &str) -> Result<JwtClaims, AppError> {
    let decoding_key = DecodingKey::from_secret(secret.as_ref());

    let token_data = decode::<JwtClaims>(token, &decoding_key, &Validation::default())
        .map_err(|e| AppError::Jwt(format!("Token inválido: {}", e)))?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_and_verify_token() {
        let user_id = Uuid::new_v4();
        let token = generate_token(user_id, "customer", "test-secret", 3600).unwrap();

        let claims = verify_token(&token, "test-secret").unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.role, "customer");
    }

    #[test]
    fn test_verify_token_wrong_secret() {
        let token = generate_token(Uuid::new_v4(), "admin", "secret-a", 3600).unwrap();
        assert!(verify_token(&token, "secret-b").is_err());
    }
}
