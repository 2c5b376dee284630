//! Input validation for user creation. Keep logic minimal and deterministic.

use crate::{CoreError, NewUser};

/// A display name must be present. Whitespace is kept as given.
pub fn validate_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() {
        return Err(CoreError::Validation("name is required".into()));
    }
    Ok(())
}

/// Validate a create request. Email format is intentionally not checked.
pub fn validate_new_user(input: &NewUser) -> Result<(), CoreError> {
    validate_name(&input.name)
}
