use crate::error::{AppError, Result};

const MIN_TOKEN_LEN: usize = 16;
const MAX_TOKEN_LEN: usize = 4096;

/// Validates a bearer token handed over by the identity provider.
///
/// # Arguments
///
/// * `token` - The raw bearer token.
///
/// # Returns
///
/// A `Result<()>` indicating whether the token is acceptable.
pub fn validate_bearer_token(token: &str) -> Result<()> {
    if token.len() < MIN_TOKEN_LEN {
        return Err(AppError::Validation(format!(
            "Bearer token must be at least {} characters long",
            MIN_TOKEN_LEN
        )));
    }

    if token.len() > MAX_TOKEN_LEN {
        return Err(AppError::Validation(format!(
            "Bearer token must be at most {} characters",
            MAX_TOKEN_LEN
        )));
    }

    if !token.chars().all(|c| c.is_ascii_graphic()) {
        return Err(AppError::Validation(
            "Bearer token can only contain visible ASCII characters".to_string(),
        ));
    }

    Ok(())
}
