use tracing::info;

use crate::validate::validate_new_user;
use crate::{CoreError, IdGenerator, NewUser, User, UserRepository};

/// Application service for reading and creating users.
///
/// Generic over the repository and the id generator so the backend is picked
/// once at startup and tests can pin ids. Holds no per-request state; every
/// call is an independent request/response.
pub struct UserService<R: UserRepository, G: IdGenerator> {
    repo: R,
    ids: G,
}

impl<R: UserRepository, G: IdGenerator> UserService<R, G> {
    pub fn new(repo: R, ids: G) -> Self {
        Self { repo, ids }
    }

    /// Fetch a user by id. `CoreError::NotFound` when the id is unknown.
    pub async fn get_user(&self, id: &str) -> Result<User, CoreError> {
        info!(op = "get_user", id = %id, "fetching user");
        self.repo.get(id).await
    }

    /// Validate, assign a fresh id, and persist a new user.
    pub async fn create_user(&self, input: NewUser) -> Result<User, CoreError> {
        info!(op = "create_user", email = %input.email, "creating user");
        validate_new_user(&input)?;

        let user = User {
            id: self.ids.next_id(),
            name: input.name,
            email: input.email,
        };
        self.repo.save(&user).await.map_err(|e| match e {
            CoreError::Storage(_) => e,
            other => CoreError::Storage(other.to_string()),
        })?;
        Ok(user)
    }
}
