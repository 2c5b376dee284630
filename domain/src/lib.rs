//! Domain library for the user service.
//!
//! Holds the `User` entity, the ports (traits) the service depends on, and
//! the error taxonomy shared by every adapter. Keep transports and IO
//! concerns out of this crate.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The sole entity. `id` is empty only before creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Input data for creating a new user. The id is assigned by the service.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct NewUser {
    pub name: String,
    pub email: String,
}

impl NewUser {
    pub fn new<N: Into<String>, E: Into<String>>(name: N, email: E) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Identifier source for newly created users.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Repository port for persisting and loading users.
///
/// Dropping a returned future abandons the call; adapters are expected to
/// stop outstanding work rather than finish it for nobody.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Exact lookup by primary key. `CoreError::NotFound` when absent.
    async fn get(&self, id: &str) -> Result<User, CoreError>;
    /// Persist a user keyed by its id.
    async fn save(&self, user: &User) -> Result<(), CoreError>;
}

#[async_trait]
impl<T: UserRepository + ?Sized> UserRepository for Arc<T> {
    async fn get(&self, id: &str) -> Result<User, CoreError> {
        (**self).get(id).await
    }

    async fn save(&self, user: &User) -> Result<(), CoreError> {
        (**self).save(user).await
    }
}

/// Core domain errors. Callers match on the kind, never on the message.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Caller input violates a precondition.
    #[error("validation error: {0}")]
    Validation(String),
    /// Requested key is absent. Expected, not a fault.
    #[error("not found")]
    NotFound,
    /// The persistence backend failed.
    #[error("storage error: {0}")]
    Storage(String),
}

pub mod adapters;
pub mod id;
pub mod service;
pub mod validate;
