use async_trait::async_trait;
use deadpool_postgres::PoolError;
use serde::Serialize;
use thiserror::Error;
use tokio_postgres::Error as PgError;

use crate::matching::ScoredCandidate;
use crate::model::{
    Employee, EmployeeId, Feedback, Match, MatchId, MatchStatus, NewEmployee, NewFeedback,
    NewProject, Project, ProjectId, SkillLevel,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("postgres error: {0}")]
    Postgres(#[from] PgError),
    #[error("failed to map row: {0}")]
    Mapping(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("employee {employee_id} is already assigned to project {project_id}")]
    EmployeeAssigned {
        employee_id: EmployeeId,
        project_id: ProjectId,
    },
    #[error("match {match_id} is {actual}, expected {expected}")]
    StatusChanged {
        match_id: MatchId,
        expected: MatchStatus,
        actual: MatchStatus,
    },
    #[error("employee code {0} is already registered")]
    EmployeeCodeTaken(String),
    #[error("duplicate match for project {project_id} and employee {employee_id}")]
    DuplicateMatch {
        project_id: ProjectId,
        employee_id: EmployeeId,
    },
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<i64>) -> Self {
        StoreError::NotFound {
            entity,
            id: id.into(),
        }
    }
}

/// Outcome of one batch upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
    /// Candidates whose existing match already carries a human decision; their
    /// scores are left alone.
    pub skipped_finalized: usize,
}

impl UpsertSummary {
    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Persistence for employees, projects, matches and feedback.
///
/// Implementations must keep at most one match per `(project, employee)` and
/// must apply each batch upsert and each accept as a single atomic unit.
#[async_trait]
pub trait MatchStore: Send + Sync {
    fn backend(&self) -> &'static str;

    async fn ping(&self) -> Result<(), StoreError>;

    async fn insert_employee(
        &self,
        employee: &NewEmployee,
        skill_vector: Option<Vec<f32>>,
    ) -> Result<Employee, StoreError>;

    async fn get_employee(&self, id: EmployeeId) -> Result<Employee, StoreError>;

    async fn list_employees(&self) -> Result<Vec<Employee>, StoreError>;

    async fn update_employee_skills(
        &self,
        id: EmployeeId,
        skills: &[SkillLevel],
        skill_vector: Option<Vec<f32>>,
    ) -> Result<Employee, StoreError>;

    async fn insert_project(
        &self,
        project: &NewProject,
        skill_vector: Option<Vec<f32>>,
    ) -> Result<Project, StoreError>;

    async fn update_project(
        &self,
        id: ProjectId,
        project: &NewProject,
        skill_vector: Option<Vec<f32>>,
    ) -> Result<Project, StoreError>;

    async fn get_project(&self, id: ProjectId) -> Result<Project, StoreError>;

    /// Insert new `SUGGESTED` matches and refresh scores on existing
    /// `SUGGESTED` ones. Finalized matches are counted, not touched.
    async fn upsert_matches(
        &self,
        project_id: ProjectId,
        candidates: &[ScoredCandidate],
    ) -> Result<UpsertSummary, StoreError>;

    async fn get_match(&self, id: MatchId) -> Result<Match, StoreError>;

    /// Matches for a project ordered by score descending, employee id ascending.
    async fn list_matches(&self, project_id: ProjectId) -> Result<Vec<Match>, StoreError>;

    /// `SUGGESTED -> ACCEPTED` plus `employee.current_project = match.project`,
    /// re-checking both under lock.
    async fn accept_match(&self, id: MatchId) -> Result<Match, StoreError>;

    /// Compare-and-set status change. Moving to `COMPLETED` also releases the
    /// employee when their assignment still points at the match's project.
    async fn transition_match(
        &self,
        id: MatchId,
        from: MatchStatus,
        to: MatchStatus,
    ) -> Result<Match, StoreError>;

    async fn insert_feedback(&self, feedback: &NewFeedback) -> Result<Feedback, StoreError>;

    async fn list_feedback(&self, match_id: MatchId) -> Result<Vec<Feedback>, StoreError>;

    async fn current_project(&self, employee_id: EmployeeId)
        -> Result<Option<ProjectId>, StoreError>;
}
