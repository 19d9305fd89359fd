//! Shared primitives for all Rust crates in vmwarden.

#![forbid(unsafe_code)]

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across vmwarden crates.
pub type AppResult<T> = Result<T, AppError>;

/// Maximum length Azure accepts for a resource group name.
pub const RESOURCE_GROUP_NAME_MAX_LENGTH: usize = 90;

/// Azure resource group name, the partition key of every provider call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceGroupName(String);

impl ResourceGroupName {
    /// Validates a resource group name against the provider naming rules.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        let trimmed = value.trim();

        if trimmed.is_empty() {
            return Err(AppError::Validation(
                "resource group name is required".to_owned(),
            ));
        }

        if trimmed.chars().count() > RESOURCE_GROUP_NAME_MAX_LENGTH {
            return Err(AppError::Validation(format!(
                "resource group name must be at most {RESOURCE_GROUP_NAME_MAX_LENGTH} characters"
            )));
        }

        if trimmed.ends_with('.') {
            return Err(AppError::Validation(format!(
                "resource group name '{trimmed}' must not end with a period"
            )));
        }

        let is_valid = trimmed.chars().all(|character| {
            character.is_alphanumeric() || matches!(character, '-' | '_' | '.' | '(' | ')')
        });
        if !is_valid {
            return Err(AppError::Validation(format!(
                "resource group name '{trimmed}' contains unsupported characters"
            )));
        }

        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for ResourceGroupName {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourceGroupName> for String {
    fn from(value: ResourceGroupName) -> Self {
        value.0
    }
}

impl Display for ResourceGroupName {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// Common application error categories.
#[derive(Debug, Clone, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Caller or service identity is not authenticated.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Identity is authenticated but lacks the required role assignment.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Provider throttled the request.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Cloud provider rejected or failed the request.
    #[error("provider error: {0}")]
    Provider(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::{AppError, ResourceGroupName};

    #[test]
    fn resource_group_name_trims_surrounding_whitespace() {
        let name = ResourceGroupName::new("  rg-prod-weu ");
        assert_eq!(
            name.map(String::from).unwrap_or_default(),
            "rg-prod-weu".to_owned()
        );
    }

    #[test]
    fn resource_group_name_rejects_trailing_period() {
        let result = ResourceGroupName::new("rg-prod.");
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn resource_group_name_rejects_unsupported_characters() {
        let result = ResourceGroupName::new("rg/prod");
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn resource_group_name_accepts_parentheses_and_periods() {
        assert!(ResourceGroupName::new("rg.(legacy)_01").is_ok());
    }
}
