use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::core::message::Message;

/// Failure to persist a message. Logged by the operator, never propagated.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store rejected message: {0}")]
    Rejected(String),
}

/// A completion result as appended to the message store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub operator_id: Uuid,
    pub operator_name: String,
    pub capability: String,
    pub message: Message,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn new(
        operator_id: Uuid,
        operator_name: impl Into<String>,
        capability: impl Into<String>,
        message: Message,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            operator_id,
            operator_name: operator_name.into(),
            capability: capability.into(),
            message,
            created_at: Utc::now(),
        }
    }
}

/// Append-only sink for completion results.
///
/// Appends may arrive out of order from concurrent graph nodes; each one must be atomic.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn save(&self, record: StoredMessage) -> Result<(), StoreError>;
}

/// Simple in-memory store.
#[derive(Debug, Default)]
pub struct MemoryMessageStore {
    records: Mutex<Vec<StoredMessage>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<StoredMessage> {
        self.records.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Records written by one operator, in append order.
    pub async fn by_operator(&self, operator_id: Uuid) -> Vec<StoredMessage> {
        self.records
            .lock()
            .await
            .iter()
            .filter(|r| r.operator_id == operator_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn save(&self, record: StoredMessage) -> Result<(), StoreError> {
        self.records.lock().await.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_appends() {
        let store = MemoryMessageStore::new();
        let op = Uuid::new_v4();
        store
            .save(StoredMessage::new(op, "exec", "chat", Message::text("hi")))
            .await
            .unwrap();
        store
            .save(StoredMessage::new(Uuid::new_v4(), "dev", "chat", Message::text("yo")))
            .await
            .unwrap();

        assert_eq!(store.len().await, 2);
        let mine = store.by_operator(op).await;
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].message.as_text(), Some("hi"));
    }
}
