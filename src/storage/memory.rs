//! In-process read model.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::{Subscription, User};
use crate::storage::{ReadModel, StoreData};

/// Read model kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<StoreData>,
}

impl MemoryStore {
    pub fn new(data: StoreData) -> Self {
        Self {
            data: Mutex::new(data),
        }
    }

    /// Run `f` with exclusive access to the document.
    pub async fn update<T>(&self, f: impl FnOnce(&mut StoreData) -> T) -> T {
        let mut data = self.data.lock().await;
        f(&mut data)
    }

    pub async fn snapshot(&self) -> StoreData {
        self.data.lock().await.clone()
    }
}

#[async_trait]
impl ReadModel for MemoryStore {
    async fn subscriptions(&self) -> Result<Vec<Subscription>> {
        Ok(self.data.lock().await.subscriptions.clone())
    }

    async fn subscribers_of(&self, subscription: &Subscription) -> Result<Vec<User>> {
        Ok(self.data.lock().await.subscribers_of(subscription.id))
    }

    async fn cursor(&self) -> Result<u64> {
        Ok(self.data.lock().await.cursor)
    }

    async fn advance_cursor(&self, timestamp: u64) -> Result<bool> {
        Ok(self.data.lock().await.advance_cursor(timestamp))
    }
}
