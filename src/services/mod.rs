//! Services module
//!
//! Este módulo contiene la lógica de negocio y servicios de la aplicación.
//! Los servicios encapsulan operaciones complejas que pueden involucrar
//! múltiples modelos o integraciones externas.

pub mod availability;
pub mod notifications;
pub mod payment_gateway;
pub mod pricing;
