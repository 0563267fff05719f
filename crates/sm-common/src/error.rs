use thiserror::Error;
use tracing::error;

use crate::db::StoreError;
use crate::lifecycle::InvalidTransition;
use crate::model::{EmployeeId, ProjectId};
use crate::validation::ValidationError;

#[derive(Debug, Error)]
pub enum MatchingError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("duplicate match for project {project_id} and employee {employee_id}")]
    DuplicateMatch {
        project_id: ProjectId,
        employee_id: EmployeeId,
    },
    #[error("storage failure: {0}")]
    Storage(#[source] StoreError),
}

impl From<StoreError> for MatchingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => MatchingError::NotFound { entity, id },
            StoreError::EmployeeAssigned { .. } | StoreError::EmployeeCodeTaken(_) => {
                MatchingError::Conflict(err.to_string())
            }
            StoreError::StatusChanged { .. } => MatchingError::Conflict(err.to_string()),
            StoreError::DuplicateMatch {
                project_id,
                employee_id,
            } => {
                // The upsert is keyed on the pair, so reaching this means two
                // writers bypassed it.
                error!(%project_id, %employee_id, "duplicate match row detected");
                MatchingError::DuplicateMatch {
                    project_id,
                    employee_id,
                }
            }
            other => MatchingError::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MatchId, MatchStatus};

    #[test]
    fn store_errors_map_to_caller_facing_kinds() {
        let err: MatchingError = StoreError::not_found("match", MatchId(3)).into();
        assert!(matches!(err, MatchingError::NotFound { entity: "match", id: 3 }));

        let err: MatchingError = StoreError::EmployeeAssigned {
            employee_id: EmployeeId(1),
            project_id: ProjectId(2),
        }
        .into();
        assert!(matches!(err, MatchingError::Conflict(msg) if msg.contains("already assigned")));

        let err: MatchingError = StoreError::StatusChanged {
            match_id: MatchId(1),
            expected: MatchStatus::Suggested,
            actual: MatchStatus::Rejected,
        }
        .into();
        assert!(matches!(err, MatchingError::Conflict(_)));

        let err: MatchingError = StoreError::Mapping("bad row".into()).into();
        assert!(matches!(err, MatchingError::Storage(_)));
    }
}
