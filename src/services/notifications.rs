//! Eventos de dominio y despacho de notificaciones
//!
//! El ciclo de vida de reservas emite eventos de dominio a un canal mpsc;
//! un consumidor separado es dueño de la entrega. Los fallos de publicación
//! y de entrega se loguean y nunca afectan a la operación que los originó.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::booking::BookingStatus;

/// Eventos emitidos por el gestor de ciclo de vida
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    BookingCreated {
        booking_id: Uuid,
        customer_id: Uuid,
        vehicle_id: Uuid,
        owner_id: Uuid,
        total_amount: Decimal,
    },
    BookingStatusChanged {
        booking_id: Uuid,
        customer_id: Uuid,
        owner_id: Uuid,
        previous_status: BookingStatus,
        new_status: BookingStatus,
    },
    PaymentVerified {
        booking_id: Uuid,
        customer_id: Uuid,
        owner_id: Uuid,
        transaction_ref: String,
        amount_paid: Decimal,
    },
}

impl DomainEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::BookingCreated { .. } => "booking_created",
            DomainEvent::BookingStatusChanged { .. } => "booking_status_changed",
            DomainEvent::PaymentVerified { .. } => "payment_verified",
        }
    }
}

/// Publicador de eventos compartido por los controllers.
///
/// `publish` es best-effort: si el canal está cerrado solo se loguea.
#[derive(Clone)]
pub struct EventPublisher {
    tx: mpsc::UnboundedSender<DomainEvent>,
}

impl EventPublisher {
    pub fn publish(&self, event: DomainEvent) {
        if let Err(e) = self.tx.send(event) {
            warn!("⚠️ Evento de dominio descartado (canal cerrado): {}", e);
        }
    }
}

/// Entrega de notificaciones (email, push, etc. viven detrás de este trait)
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn notify(&self, event_type: &str, payload: serde_json::Value) -> anyhow::Result<()>;
}

/// Sender por defecto: deja constancia estructurada en el log.
///
/// La entrega real de emails es responsabilidad de otro servicio del
/// marketplace que consume estos mismos payloads.
pub struct LogNotifier;

#[async_trait]
impl NotificationSender for LogNotifier {
    async fn notify(&self, event_type: &str, payload: serde_json::Value) -> anyhow::Result<()> {
        info!("📧 Notificación [{}]: {}", event_type, payload);
        Ok(())
    }
}

/// Crear el canal de eventos y arrancar el consumidor en background.
///
/// Devuelve el publicador que se inyecta en el estado compartido.
pub fn spawn_dispatcher(sender: std::sync::Arc<dyn NotificationSender>) -> EventPublisher {
    let (tx, mut rx) = mpsc::unbounded_channel::<DomainEvent>();

    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let event_type = event.event_type();
            let payload = match serde_json::to_value(&event) {
                Ok(value) => value,
                Err(e) => {
                    error!("❌ Evento [{}] no serializable: {}", event_type, e);
                    continue;
                }
            };

            // Un fallo de entrega nunca se propaga al flujo de reservas
            if let Err(e) = sender.notify(event_type, payload).await {
                error!("❌ Error entregando notificación [{}]: {}", event_type, e);
            }
        }
        info!("👋 Dispatcher de notificaciones terminado");
    });

    EventPublisher { tx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct CountingSender {
        count: Arc<std::sync::atomic::AtomicUsize>,
    }

    #[async_trait]
    impl NotificationSender for CountingSender {
        async fn notify(&self, _event_type: &str, _payload: serde_json::Value) -> anyhow::Result<()> {
            self.count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_events_reach_sender() {
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let publisher = spawn_dispatcher(Arc::new(CountingSender {
            count: count.clone(),
        }));

        publisher.publish(DomainEvent::BookingCreated {
            booking_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            vehicle_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            total_amount: Decimal::from(150),
        });

        // El consumidor corre en background; darle un instante
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_publish_after_channel_closed_does_not_panic() {
        let (tx, rx) = mpsc::unbounded_channel::<DomainEvent>();
        drop(rx);
        let publisher = EventPublisher { tx };

        // Best-effort: solo loguea
        publisher.publish(DomainEvent::PaymentVerified {
            booking_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            transaction_ref: "TX-TEST".to_string(),
            amount_paid: Decimal::from(100),
        });
    }
}
