//! Input validation and sanitization
//!
//! Form-level rules applied before any network call: the backend enforces
//! its own policies, but rejecting obviously bad input locally keeps the
//! error messages immediate and specific.

use crate::error::{Result, ZappiesError};

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Validation utilities for input sanitization and edge case handling
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Validate email shape: one `@` with a dot somewhere after it, no
    /// whitespace.
    pub fn validate_email(email: &str) -> Result<()> {
        let email = email.trim();
        if email.is_empty() {
            return Err(ZappiesError::Validation("Email is required".to_string()));
        }
        if email.chars().any(char::is_whitespace) {
            return Err(ZappiesError::Validation("Email must not contain whitespace".to_string()));
        }
        let Some((local, domain)) = email.split_once('@') else {
            return Err(ZappiesError::Validation(
                "Please enter a valid email address".to_string(),
            ));
        };
        if local.is_empty() || domain.is_empty() || !domain.contains('.') || domain.contains('@') {
            return Err(ZappiesError::Validation(
                "Please enter a valid email address".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate password strength: at least [`MIN_PASSWORD_LEN`] characters
    /// with an uppercase letter, a lowercase letter and a digit.
    pub fn validate_password(password: &str) -> Result<()> {
        if password.is_empty() {
            return Err(ZappiesError::Validation("Password is required".to_string()));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(ZappiesError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
        let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
        let has_digit = password.chars().any(|c| c.is_ascii_digit());
        if !(has_lower && has_upper && has_digit) {
            return Err(ZappiesError::Validation(
                "Password must contain uppercase, lowercase, and number".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate an optional phone number: digits with common formatting
    /// characters, at least 10 characters long. Empty input is accepted
    /// because the field is optional on sign-up.
    pub fn validate_phone(phone: &str) -> Result<()> {
        let phone = phone.trim();
        if phone.is_empty() {
            return Ok(());
        }
        let body = phone.strip_prefix('+').unwrap_or(phone);
        let allowed = body
            .chars()
            .all(|c| c.is_ascii_digit() || c == ' ' || c == '-' || c == '(' || c == ')');
        if !allowed || phone.len() < 10 {
            return Err(ZappiesError::Validation(
                "Please enter a valid phone number".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate a person's display name.
    pub fn validate_full_name(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(ZappiesError::Validation("Full name is required".to_string()));
        }
        if name.len() > 100 {
            return Err(ZappiesError::Validation(
                "Full name too long (max 100 characters)".to_string(),
            ));
        }
        if name.contains('\0') || name.contains('\r') || name.contains('\n') {
            return Err(ZappiesError::Validation(
                "Full name contains invalid characters".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate a business name.
    pub fn validate_business_name(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(ZappiesError::Validation("Business name is required".to_string()));
        }
        if name.len() > 100 {
            return Err(ZappiesError::Validation(
                "Business name too long (max 100 characters)".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate a bot name.
    pub fn validate_bot_name(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(ZappiesError::Validation("Bot name is required".to_string()));
        }
        if name.len() > 50 {
            return Err(ZappiesError::Validation(
                "Bot name too long (max 50 characters)".to_string(),
            ));
        }
        Ok(())
    }
}
