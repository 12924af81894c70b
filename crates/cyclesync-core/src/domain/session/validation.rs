//! Local credential validation, run before any provider contact

use super::error::{AuthError, AuthResult};

/// Check that `email` is plausibly shaped and `password` is non-empty
pub fn validate_credentials(email: &str, password: &str) -> AuthResult<()> {
    validate_email(email)?;
    if password.is_empty() {
        return Err(AuthError::InvalidInput("password is empty".to_string()));
    }
    Ok(())
}

/// Check that `email` looks like `local@domain.tld`
pub fn validate_email(email: &str) -> AuthResult<()> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AuthError::InvalidInput("email is empty".to_string()));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(invalid_email(email));
    }

    let (local, domain) = email.split_once('@').ok_or_else(|| invalid_email(email))?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid_email(email));
    }
    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(invalid_email(email));
    }

    Ok(())
}

fn invalid_email(email: &str) -> AuthError {
    AuthError::InvalidInput(format!("'{}' is not a valid email address", email))
}
