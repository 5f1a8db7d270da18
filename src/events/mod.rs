use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::{info, warn};

pub mod outbox;

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

    /// Sends an event and logs instead of failing when the bus is gone.
    /// Events are published after commit, so a closed bus must not turn a
    /// committed change into an error.
    pub async fn publish(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("{}", e);
        }
    }
}

/// Domain events published after a state change commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: i32,
        payment_id: i32,
    },
    PaymentCompleted {
        payment_id: i32,
        order_id: i32,
        invoice_id: String,
    },
    PaymentCancelled {
        payment_id: i32,
        order_id: i32,
    },
    PaymentFailed {
        payment_id: i32,
        order_id: i32,
    },
    BarcodesAssigned {
        order_id: i32,
        count: usize,
        order_processing: bool,
    },
    OrderStatusChanged {
        order_id: i32,
        old_status: String,
        new_status: String,
    },
    KitRegistered {
        registration_id: i32,
        barcode_id: i32,
    },
    KitStatusChanged {
        registration_id: i32,
        old_status: String,
        new_status: String,
    },
    ReportUploaded {
        registration_id: i32,
        file_name: String,
    },
}

impl Event {
    /// Whether handling this event may have left outbox rows behind.
    fn enqueues_outbox_work(&self) -> bool {
        !matches!(self, Event::OrderCreated { .. })
    }
}

/// Logs each event and wakes the outbox worker for events whose
/// transaction enqueued deliveries.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, outbox_wake: Arc<Notify>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::PaymentFailed {
                payment_id,
                order_id,
            } => {
                warn!(payment_id, order_id, "payment failed");
            }
            Event::PaymentCancelled {
                payment_id,
                order_id,
            } => {
                info!(payment_id, order_id, "payment cancelled");
            }
            other => info!("Received event: {:?}", other),
        }

        if event.enqueues_outbox_work() {
            outbox_wake.notify_one();
        }
    }

    warn!("Event processing loop has ended");
}
