use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Key the widget mirrors the flag under.
pub const IS_SUBSCRIBED_KEY: &str = "isSubscribed";
/// The only value ever written under [`IS_SUBSCRIBED_KEY`]; "not subscribed" is the key being absent.
pub const SUBSCRIBED_VALUE: &str = "true";

/// Session-lifetime key/value storage, shaped after the browser's `sessionStorage`.
#[async_trait]
pub trait Store {
    async fn get_item(&self, key: &str) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>>;
    async fn set_item(&self, key: &str, value: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    async fn remove_item(&self, key: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    async fn clear(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// In-memory store. Its contents live exactly as long as the value does.
#[derive(Default)]
pub struct MemoryStore {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    #[cfg(test)]
    pub(crate) async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>> {
        let items = self.items.read().await;
        Ok(items.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut items = self.items.write().await;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut items = self.items.write().await;
        items.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.items.write().await.clear();
        Ok(())
    }
}
