// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use thiserror::Error;

/// Errors raised by the hierarchy engine and the project aggregator.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    #[error("account {account_id} is not authorized to access project {project_id}")]
    Unauthorized { account_id: i64, project_id: i64 },

    #[error("data integrity violation at task {task_id}: {reason}")]
    DataIntegrity { task_id: i64, reason: String },

    // Logged by the tree builder, never returned.
    #[error("task {task_id} references parent {parent_id} outside the visible task set")]
    AmbiguousParent { task_id: i64, parent_id: i64 },

    #[error("invalid input: {0}")]
    Invalid(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl CoreError {
    pub fn not_found(kind: &'static str, id: i64) -> Self {
        Self::NotFound { kind, id }
    }

    pub fn integrity(task_id: i64, reason: impl Into<String>) -> Self {
        Self::DataIntegrity {
            task_id,
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Unauthorized { .. } => "unauthorized",
            Self::DataIntegrity { .. } => "data_integrity",
            Self::AmbiguousParent { .. } => "ambiguous_parent",
            Self::Invalid(_) => "invalid_input",
            Self::Store(_) => "store_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_and_unauthorized_are_distinct() {
        let missing = CoreError::not_found("project", 7);
        let denied = CoreError::Unauthorized {
            account_id: 3,
            project_id: 7,
        };

        assert_eq!(missing.code(), "not_found");
        assert_eq!(denied.code(), "unauthorized");
        assert_eq!(missing.to_string(), "project 7 not found");
        assert_eq!(
            denied.to_string(),
            "account 3 is not authorized to access project 7"
        );
    }

    #[test]
    fn test_store_errors_keep_their_message() {
        let err: CoreError = anyhow::anyhow!("Failed to scan tasks").into();
        assert_eq!(err.code(), "store_error");
        assert_eq!(err.to_string(), "Failed to scan tasks");
    }
}
