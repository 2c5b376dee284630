use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::{CoreError, User, UserRepository};

/// In-memory user repository. A single reader/writer lock guards the whole
/// map: lookups share it, saves take it exclusively. Nothing is evicted and
/// nothing survives a restart.
pub struct InMemoryUserRepo {
    inner: RwLock<HashMap<String, User>>,
}

impl InMemoryUserRepo {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored users.
    pub fn len(&self) -> Result<usize, CoreError> {
        let map = self
            .inner
            .read()
            .map_err(|_| CoreError::Storage("lock poisoned".into()))?;
        Ok(map.len())
    }

    pub fn is_empty(&self) -> Result<bool, CoreError> {
        Ok(self.len()? == 0)
    }
}

impl Default for InMemoryUserRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepo {
    async fn get(&self, id: &str) -> Result<User, CoreError> {
        let map = self
            .inner
            .read()
            .map_err(|_| CoreError::Storage("lock poisoned".into()))?;
        map.get(id).cloned().ok_or(CoreError::NotFound)
    }

    async fn save(&self, user: &User) -> Result<(), CoreError> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| CoreError::Storage("lock poisoned".into()))?;
        // upsert
        map.insert(user.id.clone(), user.clone());
        Ok(())
    }
}
