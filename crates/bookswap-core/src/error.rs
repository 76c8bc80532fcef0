// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for bookswap-core.
//!
//! Every lifecycle and moderation operation reports failures through [`CoreError`].
//! Each variant carries a stable machine-readable code (see [`CoreError::error_code`])
//! that the HTTP layer maps to a status.

use std::fmt;

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Kind of entity referenced by a [`CoreError::NotFound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    /// A physical book copy.
    Instance,
    /// A pending reservation.
    Booking,
    /// Bibliographic record.
    Book,
    /// Drop-off / pickup location.
    ExchangePoint,
    /// User-submitted listing awaiting approval.
    ModerationRequest,
    /// Registered user.
    User,
}

impl Entity {
    /// Human-readable entity name used in error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Instance => "Instance",
            Self::Booking => "Booking",
            Self::Book => "Book",
            Self::ExchangePoint => "Exchange point",
            Self::ModerationRequest => "Moderation request",
            Self::User => "User",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core errors that can occur while processing an operation.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum CoreError {
    /// The referenced entity does not exist (or is not visible to the caller).
    #[error("{entity} '{id}' not found")]
    NotFound {
        /// What kind of entity was looked up.
        entity: Entity,
        /// The identifier that was looked up.
        id: i64,
    },

    /// A required text field was empty or a value was out of range.
    #[error("Validation error for '{field}': {message}")]
    Validation {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// The instance is not in the state the operation requires.
    #[error("Instance '{instance_id}' is in invalid state: expected '{expected}', got '{actual}'")]
    Conflict {
        /// The instance ID.
        instance_id: i64,
        /// The status the operation requires.
        expected: String,
        /// The status the instance actually has.
        actual: String,
    },

    /// The caller is authenticated but does not hold the entity being changed.
    #[error("Forbidden: {reason}")]
    Forbidden {
        /// Why access was refused.
        reason: String,
    },

    /// A collaborator (notification transport, image store) is misconfigured.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Writing an uploaded file failed.
    #[error("Storage error at '{path}': {details}")]
    Storage {
        /// The path that could not be written.
        path: String,
        /// Error details.
        details: String,
    },

    /// Database operation failed.
    #[error("Database error during '{operation}': {details}")]
    Database {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },
}

impl CoreError {
    /// Shorthand for a [`CoreError::NotFound`].
    pub fn not_found(entity: Entity, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// Shorthand for a [`CoreError::Validation`].
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Conflict { .. } => "CONFLICT",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Storage { .. } => "STORAGE_ERROR",
            Self::Database { .. } => "DATABASE_ERROR",
        }
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::Database {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for CoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        CoreError::Database {
            operation: "migrate".to_string(),
            details: err.to_string(),
        }
    }
}
