//! Message queue contract and an in-memory queue.
//!
//! Delivery is at-least-once: a received message that is never
//! acknowledged comes back.

use crate::error::SyncResult;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

/// A received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Handle used to acknowledge this delivery.
    pub receipt: String,
    pub body: String,
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Receives up to `max` messages. An empty batch means the queue is
    /// drained.
    async fn receive(&self, max: usize) -> SyncResult<Vec<QueueMessage>>;

    /// Deletes a processed message.
    async fn ack(&self, receipt: &str) -> SyncResult<()>;
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<String>,
    in_flight: HashMap<String, String>,
    next_receipt: u64,
}

/// In-memory queue. Unacknowledged messages stay in flight until
/// [`MemoryQueue::redeliver`] returns them to the front of the queue.
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<QueueState>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, body: impl Into<String>) {
        self.state.lock().await.pending.push_back(body.into());
    }

    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn in_flight_len(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    /// Makes every unacknowledged message receivable again, as a
    /// visibility timeout would.
    pub async fn redeliver(&self) -> usize {
        let mut state = self.state.lock().await;
        let mut returned: Vec<(String, String)> = state.in_flight.drain().collect();
        // Receipts are issued in order; keep the original order.
        returned.sort_by_key(|(receipt, _)| receipt_number(receipt));
        let count = returned.len();
        for (_, body) in returned.into_iter().rev() {
            state.pending.push_front(body);
        }
        count
    }
}

fn receipt_number(receipt: &str) -> u64 {
    receipt
        .strip_prefix("receipt-")
        .and_then(|n| n.parse().ok())
        .unwrap_or(u64::MAX)
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn receive(&self, max: usize) -> SyncResult<Vec<QueueMessage>> {
        let mut state = self.state.lock().await;
        let mut batch = Vec::new();
        while batch.len() < max {
            let Some(body) = state.pending.pop_front() else {
                break;
            };
            state.next_receipt += 1;
            let receipt = format!("receipt-{}", state.next_receipt);
            state.in_flight.insert(receipt.clone(), body.clone());
            batch.push(QueueMessage { receipt, body });
        }
        Ok(batch)
    }

    async fn ack(&self, receipt: &str) -> SyncResult<()> {
        self.state.lock().await.in_flight.remove(receipt);
        Ok(())
    }
}
