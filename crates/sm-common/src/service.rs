//! Entry points used by the HTTP layer: employee and project intake,
//! recomputation, lifecycle actions, feedback and the read queries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::db::{MatchStore, StoreError, UpsertSummary};
use crate::embedding::SkillVectorBuilder;
use crate::error::MatchingError;
use crate::lifecycle::{InvalidTransition, MatchAction};
use crate::matching::{run_matching_pass, ScoreBasis, ScoredCandidate};
use crate::model::{
    Employee, EmployeeId, Feedback, Match, MatchId, MatchStatus, NewEmployee, NewFeedback,
    NewProject, Project, ProjectId, SkillLevel,
};
use crate::validation::{validate_skill_levels, ValidationError};

/// One row of the ranked list shown to a manager.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchListing {
    pub match_id: MatchId,
    pub employee_id: EmployeeId,
    pub employee_name: String,
    pub department: String,
    pub position: String,
    pub match_score: f64,
    pub skills_match_percentage: f64,
    pub score_basis: ScoreBasis,
    pub availability_match: bool,
    pub status: MatchStatus,
}

impl MatchListing {
    fn new(m: &Match, employee: Option<&Employee>) -> Self {
        Self {
            match_id: m.id,
            employee_id: m.employee_id,
            employee_name: employee.map(|e| e.name.clone()).unwrap_or_default(),
            department: employee.map(|e| e.department.clone()).unwrap_or_default(),
            position: employee.map(|e| e.position.clone()).unwrap_or_default(),
            match_score: m.match_score,
            skills_match_percentage: m.skills_match_percentage,
            score_basis: m.score_basis,
            availability_match: m.availability_match,
            status: m.status,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecomputeOutcome {
    pub project_id: ProjectId,
    pub run_id: String,
    pub considered: usize,
    pub summary: UpsertSummary,
    /// Ranked `(employee, score, coverage)` for every eligible employee.
    pub candidates: Vec<ScoredCandidate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectWithMatches {
    pub project: Project,
    pub run_id: String,
    pub summary: UpsertSummary,
    pub matches: Vec<MatchListing>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransitionOutcome {
    pub match_id: MatchId,
    pub project_id: ProjectId,
    pub employee_id: EmployeeId,
    pub status: MatchStatus,
}

fn transition_outcome_label(result: &Result<TransitionOutcome, MatchingError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(MatchingError::Conflict(_)) => "conflict",
        Err(MatchingError::InvalidTransition(_)) => "invalid",
        Err(MatchingError::Forbidden(_)) => "forbidden",
        Err(MatchingError::NotFound { .. }) => "not_found",
        Err(_) => "error",
    }
}

pub struct MatchingService {
    store: Arc<dyn MatchStore>,
    vectors: SkillVectorBuilder,
}

impl MatchingService {
    pub fn new(store: Arc<dyn MatchStore>, vectors: SkillVectorBuilder) -> Self {
        Self { store, vectors }
    }

    pub fn store(&self) -> &Arc<dyn MatchStore> {
        &self.store
    }

    #[instrument(skip(self, employee), fields(code = %employee.employee_code))]
    pub async fn register_employee(&self, employee: NewEmployee) -> Result<Employee, MatchingError> {
        employee.validate()?;
        let vector = self.vectors.build(&employee.skills).await;
        let stored = self.store.insert_employee(&employee, vector).await?;
        info!(employee_id = %stored.id, "registered employee");
        Ok(stored)
    }

    #[instrument(skip(self, skills))]
    pub async fn update_employee_skills(
        &self,
        id: EmployeeId,
        skills: Vec<SkillLevel>,
    ) -> Result<Employee, MatchingError> {
        validate_skill_levels("skills", &skills)?;
        self.store.get_employee(id).await?;
        let vector = self.vectors.build(&skills).await;
        Ok(self.store.update_employee_skills(id, &skills, vector).await?)
    }

    async fn ensure_manager(&self, manager_id: EmployeeId) -> Result<(), MatchingError> {
        match self.store.get_employee(manager_id).await {
            Ok(_) => Ok(()),
            Err(StoreError::NotFound { .. }) => Err(ValidationError::new(
                "manager_id",
                format!("employee {manager_id} does not exist"),
            )
            .into()),
            Err(err) => Err(err.into()),
        }
    }

    /// Persist a new project and run its first matching pass.
    #[instrument(skip(self, project), fields(title = %project.title))]
    pub async fn create_project(
        &self,
        project: NewProject,
    ) -> Result<ProjectWithMatches, MatchingError> {
        project.validate()?;
        self.ensure_manager(project.manager_id).await?;

        let vector = self.vectors.build(&project.required_skills).await;
        let stored = self.store.insert_project(&project, vector).await?;
        info!(project_id = %stored.id, "created project");

        self.with_matches(stored).await
    }

    /// Replace a project's definition and recompute its matches.
    #[instrument(skip(self, project))]
    pub async fn update_project(
        &self,
        id: ProjectId,
        project: NewProject,
    ) -> Result<ProjectWithMatches, MatchingError> {
        project.validate()?;
        self.store.get_project(id).await?;
        self.ensure_manager(project.manager_id).await?;

        let vector = self.vectors.build(&project.required_skills).await;
        let stored = self.store.update_project(id, &project, vector).await?;

        self.with_matches(stored).await
    }

    async fn with_matches(&self, project: Project) -> Result<ProjectWithMatches, MatchingError> {
        let outcome = self.recompute_for(&project).await?;
        let matches = self.list_matches(project.id).await?;
        Ok(ProjectWithMatches {
            project,
            run_id: outcome.run_id,
            summary: outcome.summary,
            matches,
        })
    }

    /// Filter, score and upsert every eligible employee for a project.
    #[instrument(skip(self))]
    pub async fn recompute(&self, project_id: ProjectId) -> Result<RecomputeOutcome, MatchingError> {
        let project = self.store.get_project(project_id).await?;
        self.recompute_for(&project).await
    }

    async fn recompute_for(&self, project: &Project) -> Result<RecomputeOutcome, MatchingError> {
        let started = Instant::now();
        let employees = self.store.list_employees().await?;
        let pass = run_matching_pass(project, &employees);
        let summary = self
            .store
            .upsert_matches(project.id, &pass.candidates)
            .await?;

        metrics::counter!("sm_matches_upserted_total").increment(summary.written() as u64);
        metrics::histogram!("sm_matching_pass_seconds").record(started.elapsed().as_secs_f64());
        info!(
            run_id = %pass.run_id,
            project_id = %project.id,
            considered = pass.considered,
            eligible = pass.candidates.len(),
            inserted = summary.inserted,
            updated = summary.updated,
            skipped_finalized = summary.skipped_finalized,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "matching pass complete"
        );

        Ok(RecomputeOutcome {
            project_id: project.id,
            run_id: pass.run_id,
            considered: pass.considered,
            summary,
            candidates: pass.candidates,
        })
    }

    /// Apply a human decision to a match.
    #[instrument(skip(self, action), fields(action = action.as_ref()))]
    pub async fn transition(
        &self,
        match_id: MatchId,
        action: MatchAction,
        actor: EmployeeId,
    ) -> Result<TransitionOutcome, MatchingError> {
        let result = self.apply_transition(match_id, action, actor).await;
        let outcome = transition_outcome_label(&result);
        metrics::counter!(
            "sm_transitions_total",
            "action" => action.as_ref().to_string(),
            "outcome" => outcome
        )
        .increment(1);

        match &result {
            Ok(done) => info!(
                %match_id,
                %actor,
                project_id = %done.project_id,
                employee_id = %done.employee_id,
                status = %done.status,
                "match transitioned"
            ),
            Err(err) => warn!(%match_id, %actor, outcome, error = %err, "transition refused"),
        }
        result
    }

    async fn apply_transition(
        &self,
        match_id: MatchId,
        action: MatchAction,
        actor: EmployeeId,
    ) -> Result<TransitionOutcome, MatchingError> {
        let current = self.store.get_match(match_id).await?;
        let target = current.status.apply(action)?;

        let stored = match action {
            MatchAction::Accept => self.store.accept_match(match_id).await,
            MatchAction::Reject => {
                self.store
                    .transition_match(match_id, current.status, target)
                    .await
            }
            MatchAction::Complete => {
                let project = self.store.get_project(current.project_id).await?;
                if project.manager_id != actor {
                    return Err(MatchingError::Forbidden(format!(
                        "only the manager of project {} may complete its matches",
                        project.id
                    )));
                }
                self.store
                    .transition_match(match_id, current.status, target)
                    .await
            }
        };

        // Lost a race with another writer: report it against the status the
        // row actually holds now.
        let stored = stored.map_err(|err| match err {
            StoreError::StatusChanged { actual, .. } => {
                MatchingError::InvalidTransition(InvalidTransition {
                    from: actual,
                    action,
                })
            }
            other => other.into(),
        })?;

        Ok(TransitionOutcome {
            match_id: stored.id,
            project_id: stored.project_id,
            employee_id: stored.employee_id,
            status: stored.status,
        })
    }

    /// Record feedback on a decided match.
    #[instrument(skip(self, feedback), fields(match_id = %feedback.match_id))]
    pub async fn submit_feedback(&self, feedback: NewFeedback) -> Result<Feedback, MatchingError> {
        feedback.validate()?;

        let target = self.store.get_match(feedback.match_id).await?;
        if !target.status.is_finalized() {
            return Err(MatchingError::Conflict(format!(
                "match {} is still {}; feedback needs a decision first",
                target.id, target.status
            )));
        }
        match self.store.get_employee(feedback.author_id).await {
            Ok(_) => {}
            Err(StoreError::NotFound { .. }) => {
                return Err(ValidationError::new(
                    "author_id",
                    format!("employee {} does not exist", feedback.author_id),
                )
                .into())
            }
            Err(err) => return Err(err.into()),
        }

        Ok(self.store.insert_feedback(&feedback).await?)
    }

    pub async fn list_feedback(&self, match_id: MatchId) -> Result<Vec<Feedback>, MatchingError> {
        self.store.get_match(match_id).await?;
        Ok(self.store.list_feedback(match_id).await?)
    }

    /// Ranked matches for a project: score descending, employee id ascending.
    pub async fn list_matches(
        &self,
        project_id: ProjectId,
    ) -> Result<Vec<MatchListing>, MatchingError> {
        self.store.get_project(project_id).await?;
        let matches = self.store.list_matches(project_id).await?;
        let employees: HashMap<EmployeeId, Employee> = self
            .store
            .list_employees()
            .await?
            .into_iter()
            .map(|e| (e.id, e))
            .collect();

        Ok(matches
            .iter()
            .map(|m| MatchListing::new(m, employees.get(&m.employee_id)))
            .collect())
    }

    pub async fn current_project(
        &self,
        employee_id: EmployeeId,
    ) -> Result<Option<ProjectId>, MatchingError> {
        Ok(self.store.current_project(employee_id).await?)
    }
}
