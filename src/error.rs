//! Error types for store calls and user-facing actions.

use serde::Serialize;
use std::fmt;

/// Failure reported by a [`DataStore`](crate::store::DataStore) call.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no row in {table} matched")]
    NotFound { table: String },

    #[error("expected a single row from {table}, found {count}")]
    MultipleRows { table: String, count: usize },

    #[error("store unreachable: {0}")]
    Transport(String),

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("constraint violated on {table}: {reason}")]
    Constraint { table: String, reason: String },

    #[error("refusing unfiltered {operation} on {table}")]
    UnfilteredMutation {
        table: String,
        operation: &'static str,
    },

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("unknown column {column} on {table}")]
    UnknownColumn { table: String, column: String },

    #[error("unknown relation {relation} on {table}")]
    UnknownRelation { table: String, relation: String },

    #[error("malformed row from {table}: {reason}")]
    MalformedRow { table: String, reason: String },
}

impl StoreError {
    pub fn malformed(table: &str, reason: impl fmt::Display) -> Self {
        Self::MalformedRow {
            table: table.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn constraint(table: &str, reason: impl fmt::Display) -> Self {
        Self::Constraint {
            table: table.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True for failures that a retry might clear.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Result type for store calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Lookup
    NotFound,

    // Store failures
    StoreUnavailable,
    Unauthorized,
    InvalidRow,

    // Caller mistakes
    InvalidInput,
    NotEngineer,

    // Batched membership writes that landed halfway
    PartialApply,

    Internal,
}

/// Structured, user-visible error for a failed load or mutation.
#[derive(Debug, Serialize)]
pub struct ActionError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ActionError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    // Convenience constructors

    pub fn not_found(what: &str, id: &str) -> Self {
        Self::new(ErrorCode::NotFound, format!("{} not found: {}", what, id))
    }

    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, reason)
    }

    pub fn not_engineer(profile_id: &str) -> Self {
        Self::new(
            ErrorCode::NotEngineer,
            "Yacht assignments are only applicable to engineers.",
        )
        .with_details(format!("profile {}", profile_id))
    }

    pub fn partial_apply(table: &str, err: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::PartialApply,
            format!("Membership update on {} was only partly applied", table),
        )
        .with_details(err.to_string())
    }
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ActionError {}

impl From<StoreError> for ActionError {
    fn from(err: StoreError) -> Self {
        let code = match &err {
            StoreError::NotFound { .. } => ErrorCode::NotFound,
            StoreError::Transport(_) => ErrorCode::StoreUnavailable,
            StoreError::Unauthorized(_) => ErrorCode::Unauthorized,
            StoreError::MalformedRow { .. } | StoreError::MultipleRows { .. } => {
                ErrorCode::InvalidRow
            }
            StoreError::Constraint { .. } => ErrorCode::InvalidInput,
            StoreError::UnfilteredMutation { .. }
            | StoreError::UnknownTable(_)
            | StoreError::UnknownColumn { .. }
            | StoreError::UnknownRelation { .. } => ErrorCode::Internal,
        };
        Self::new(code, err.to_string())
    }
}

/// Result type for fleet actions.
pub type ActionResult<T> = std::result::Result<T, ActionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_codes() {
        let err: ActionError = StoreError::Transport("timeout".into()).into();
        assert_eq!(err.code, ErrorCode::StoreUnavailable);
        assert!(err.message.contains("timeout"));

        let err: ActionError = StoreError::NotFound {
            table: "yachts".into(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::NotFound);

        let err: ActionError = StoreError::MultipleRows {
            table: "profiles".into(),
            count: 2,
        }
        .into();
        assert_eq!(err.code, ErrorCode::InvalidRow);
    }

    #[test]
    fn serializes_without_empty_details() {
        let json = serde_json::to_value(ActionError::invalid_input("bad level")).unwrap();
        assert_eq!(json["code"], "INVALID_INPUT");
        assert!(json.get("details").is_none());

        let json = serde_json::to_value(ActionError::not_engineer("p1")).unwrap();
        assert_eq!(json["code"], "NOT_ENGINEER");
        assert_eq!(json["details"], "profile p1");
    }

    #[test]
    fn only_transport_is_transient() {
        assert!(StoreError::Transport("reset".into()).is_transient());
        assert!(!StoreError::Unauthorized("rls".into()).is_transient());
    }
}
