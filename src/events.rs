use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the services after state changes are committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Order events
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCompleted(Uuid),
    OrderPaymentUpdated(Uuid),

    // Catalog events
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    ProductDeleted(Uuid),

    // User events
    UserCreated(Uuid),
    UserUpdated(Uuid),
    UserDeleted(Uuid),

    // Bulk import events
    ProductsImported {
        import_id: Uuid,
        created: usize,
        updated: usize,
        failed: usize,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the processing
    /// loop has shut down. State changes are already committed by the
    /// time events fire, so a full channel must not fail the request.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Event dropped: {}", e);
        }
    }
}

/// Consumes events from the channel and reacts to them. Runs for the
/// lifetime of the server as a background task.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::OrderCreated(order_id) => {
                info!("Order created: {}", order_id);
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(
                    "Order {} status changed: {} -> {}",
                    order_id, old_status, new_status
                );
            }
            Event::OrderCompleted(order_id) => {
                info!("Order completed: {}", order_id);
            }
            Event::OrderPaymentUpdated(order_id) => {
                info!("Order payment updated: {}", order_id);
            }
            Event::ProductCreated(product_id) => {
                info!("Product created: {}", product_id);
            }
            Event::ProductUpdated(product_id) => {
                info!("Product updated: {}", product_id);
            }
            Event::ProductDeleted(product_id) => {
                info!("Product deleted: {}", product_id);
            }
            Event::UserCreated(user_id) => {
                info!("User created: {}", user_id);
            }
            Event::UserUpdated(user_id) => {
                info!("User updated: {}", user_id);
            }
            Event::UserDeleted(user_id) => {
                info!("User deleted: {}", user_id);
            }
            Event::ProductsImported {
                import_id,
                created,
                updated,
                failed,
            } => {
                if failed > 0 {
                    warn!(
                        "Import {} finished with failures: created={}, updated={}, failed={}",
                        import_id, created, updated, failed
                    );
                } else {
                    info!(
                        "Import {} finished: created={}, updated={}",
                        import_id, created, updated
                    );
                }
            }
        }
    }

    warn!("Event processing loop has ended");
}
