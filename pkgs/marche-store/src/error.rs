//! Error types for the messaging core.
//!
//! Every operation of the registry, the message store, the presence tracker
//! and the façade returns [`Result`]. The variants line up with the
//! client-facing error codes of the HTTP surface: validation, membership,
//! missing rows, oversized media, media-store failures and database
//! failures.

use crate::media::MediaError;
use crate::message_type::MessageType;
use sea_orm::DbErr;
use thiserror::Error;

/// A type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the messaging core.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or incomplete request. `field` names the offending input.
    #[error("Validation failed on `{field}`: {message}")]
    Validation { field: String, message: String },

    /// Caller is not a member of the conversation.
    #[error("Caller is not a member of conversation {conversation_id}")]
    Forbidden { conversation_id: i64 },

    /// Conversation or user id does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Attachment exceeds the ceiling of its message type.
    #[error("{message_type} attachment of {size} bytes exceeds the {max_bytes} byte limit")]
    PayloadTooLarge {
        message_type: MessageType,
        size: usize,
        max_bytes: usize,
    },

    /// The media store failed or returned an unusable result.
    #[error("Media upload failed: {0}")]
    MediaUpload(#[source] MediaError),

    /// Unexpected persistence failure.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl Error {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn conversation_not_found(id: i64) -> Self {
        Error::NotFound {
            entity: "Conversation",
            id,
        }
    }

    pub fn user_not_found(id: i64) -> Self {
        Error::NotFound { entity: "User", id }
    }

    /// True for failures the caller cannot fix by changing the request.
    pub fn is_internal(&self) -> bool {
        matches!(self, Error::MediaUpload(_) | Error::Database(_))
    }
}

/// Detects a unique-constraint violation, whichever way the driver reports it.
pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    if matches!(
        err.sql_err(),
        Some(sea_orm::SqlErr::UniqueConstraintViolation(_))
    ) {
        return true;
    }
    err.to_string().contains("UNIQUE constraint failed")
}
