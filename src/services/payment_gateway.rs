//! Adaptador de pasarela de pago
//!
//! El core solo necesita una operación de la pasarela: verificar una
//! referencia de transacción externa. El protocolo concreto queda detrás
//! del trait; la implementación HTTP usa reqwest contra la API de la
//! pasarela configurada.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::utils::errors::{AppError, AppResult};

/// Resultado de verificación reportado por la pasarela
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayVerification {
    pub status: String,
    pub amount_paid: Decimal,
    pub currency: String,
}

impl GatewayVerification {
    /// La pasarela reporta distintos literales de éxito según versión
    pub fn is_successful(&self) -> bool {
        matches!(self.status.as_str(), "completed" | "success" | "successful")
    }
}

/// Interfaz mínima consumida por el ciclo de vida de reservas
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn verify_transaction(&self, reference: &str) -> AppResult<GatewayVerification>;
}

/// Implementación HTTP de la pasarela de pago
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpPaymentGateway {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn verify_transaction(&self, reference: &str) -> AppResult<GatewayVerification> {
        let url = format!("{}/transaction/verify/{}", self.base_url, reference);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| AppError::ExternalApi(format!("Error contactando la pasarela: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::PaymentVerificationFailed(format!(
                "La pasarela respondió {} para la referencia '{}'",
                response.status(),
                reference
            )));
        }

        let verification = response
            .json::<GatewayVerification>()
            .await
            .map_err(|e| AppError::ExternalApi(format!("Respuesta inválida de la pasarela: {}", e)))?;

        Ok(verification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_literals() {
        let v = GatewayVerification {
            status: "completed".to_string(),
            amount_paid: Decimal::from(100),
            currency: "EUR".to_string(),
        };
        assert!(v.is_successful());

        let failed = GatewayVerification {
            status: "declined".to_string(),
            ..v
        };
        assert!(!failed.is_successful());
    }
}
