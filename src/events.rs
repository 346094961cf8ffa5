use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the order, payment, and tracking services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Order events
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderArchived(Uuid),

    // Payment events
    PaymentInitiated(Uuid),
    PaymentConfirmed {
        payment_id: Uuid,
        order_id: Uuid,
        transaction_id: Option<String>,
    },
    PaymentFailed {
        payment_id: Uuid,
        order_id: Uuid,
        response_code: String,
    },

    // Tracking events
    TrackingEventRecorded {
        order_id: Uuid,
        status: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
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
}

/// Creates a bounded event channel pair.
pub fn channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer);
    (EventSender::new(tx), rx)
}

/// Consumes events from the channel and logs them. External consumers
/// (notifications, reporting) subscribe outside this core.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderCreated(order_id) => {
                info!(order_id = %order_id, "event: order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(
                    order_id = %order_id,
                    old_status = %old_status,
                    new_status = %new_status,
                    "event: order status changed"
                );
            }
            Event::OrderArchived(order_id) => {
                info!(order_id = %order_id, "event: order archived");
            }
            Event::PaymentInitiated(payment_id) => {
                info!(payment_id = %payment_id, "event: payment initiated");
            }
            Event::PaymentConfirmed {
                payment_id,
                order_id,
                transaction_id,
            } => {
                info!(
                    payment_id = %payment_id,
                    order_id = %order_id,
                    transaction_id = ?transaction_id,
                    "event: payment confirmed"
                );
            }
            Event::PaymentFailed {
                payment_id,
                order_id,
                response_code,
            } => {
                warn!(
                    payment_id = %payment_id,
                    order_id = %order_id,
                    response_code = %response_code,
                    "event: payment failed"
                );
            }
            Event::TrackingEventRecorded { order_id, status } => {
                info!(order_id = %order_id, status = %status, "event: tracking event recorded");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_and_receive() {
        let (sender, mut rx) = channel(8);
        let id = Uuid::new_v4();
        sender.send(Event::OrderCreated(id)).await.unwrap();

        match rx.recv().await {
            Some(Event::OrderCreated(received)) => assert_eq!(received, id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_fails_after_receiver_dropped() {
        let (sender, rx) = channel(1);
        drop(rx);
        assert!(sender.send(Event::OrderCreated(Uuid::new_v4())).await.is_err());
    }
}
