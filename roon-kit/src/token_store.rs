// Copyright 2026 Roon Labs and contributors.
// This file is dual-licensed as MIT or Apache-2.0.
// see LICENSE for license details.

//! Abstract per-Core token persistence. The connection engine depends only on
//! this interface; hosts may back it with a file, a keychain, or a database.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// A store of registration tokens, keyed by Core id.
#[async_trait]
pub trait TokenStore: Send + Sync + 'static {
    /// Look up the token remembered for a Core, if any.
    async fn token(&self, core_id: &str) -> Option<String>;
    /// Remember a token for a Core, replacing any existing one.
    async fn save_token(&self, core_id: &str, token: String);
    /// Forget the token remembered for a Core.
    async fn remove_token(&self, core_id: &str);
    /// Forget every remembered token.
    async fn remove_all(&self);
}

/// A simple in-memory [`TokenStore`], useful for tests and hosts with no
/// persistence requirement.
#[derive(Default)]
pub struct InMemoryTokenStore {
    tokens: Mutex<HashMap<String, String>>,
}

impl InMemoryTokenStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn token(&self, core_id: &str) -> Option<String> {
        self.tokens.lock().unwrap().get(core_id).cloned()
    }

    async fn save_token(&self, core_id: &str, token: String) {
        self.tokens.lock().unwrap().insert(core_id.to_string(), token);
    }

    async fn remove_token(&self, core_id: &str) {
        self.tokens.lock().unwrap().remove(core_id);
    }

    async fn remove_all(&self) {
        self.tokens.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn remembers_and_forgets_tokens() {
        let store = InMemoryTokenStore::new();
        assert_eq!(store.token("c1").await, None);

        store.save_token("c1", "t1".into()).await;
        assert_eq!(store.token("c1").await, Some("t1".into()));

        store.save_token("c1", "t2".into()).await;
        assert_eq!(store.token("c1").await, Some("t2".into()));

        store.remove_token("c1").await;
        assert_eq!(store.token("c1").await, None);
    }

    #[tokio::test]
    async fn remove_all_clears_every_core() {
        let store = InMemoryTokenStore::new();
        store.save_token("c1", "t1".into()).await;
        store.save_token("c2", "t2".into()).await;
        store.remove_all().await;
        assert_eq!(store.token("c1").await, None);
        assert_eq!(store.token("c2").await, None);
    }
}
