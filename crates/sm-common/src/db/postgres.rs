use async_trait::async_trait;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::Json;
use tokio_postgres::{Error as PgError, Row};
use tracing::{debug, error, instrument};

use crate::db::store::{MatchStore, StoreError, UpsertSummary};
use crate::db::util::TimedClientExt;
use crate::db::PgPool;
use crate::matching::{rank_matches, ScoreBasis, ScoredCandidate};
use crate::model::{
    Availability, Employee, EmployeeId, Feedback, FeedbackId, Match, MatchId, MatchStatus,
    NewEmployee, NewFeedback, NewProject, Project, ProjectId, ProjectStatus, SkillLevel,
};

const EMPLOYEE_COLUMNS: &str = "id, employee_code, name, department, position, skills, \
     experience_years, available_from, available_until, current_project_id, skill_vector";

const PROJECT_COLUMNS: &str = "id, title, description, required_skills, start_date, end_date, \
     status, manager_id, team_size, priority, skill_vector, created_at";

const MATCH_COLUMNS: &str = "id, project_id, employee_id, match_score, skills_match_percentage, \
     score_basis, availability_match, status, created_at, updated_at";

const FEEDBACK_COLUMNS: &str = "id, match_id, rating, text, author_id, created_at";

/// `RETURNING (xmax = 0)` is true for a fresh insert and false for an update.
/// The `WHERE` on the conflict arm leaves finalized matches alone, in which
/// case no row comes back.
const UPSERT_MATCH_SQL: &str = "INSERT INTO staffing.matches (
        project_id, employee_id, match_score, skills_match_percentage, score_basis,
        availability_match, status
    ) VALUES ($1, $2, $3, $4, $5, TRUE, 'SUGGESTED')
    ON CONFLICT (project_id, employee_id) DO UPDATE SET
        match_score = EXCLUDED.match_score,
        skills_match_percentage = EXCLUDED.skills_match_percentage,
        score_basis = EXCLUDED.score_basis,
        availability_match = TRUE,
        updated_at = NOW()
    WHERE staffing.matches.status = 'SUGGESTED'
    RETURNING (xmax = 0) AS inserted";

const MATCH_EMPLOYEE_SQL: &str = "SELECT employee_id FROM staffing.matches WHERE id = $1";

const LOCK_EMPLOYEE_SQL: &str =
    "SELECT current_project_id FROM staffing.employees WHERE id = $1 FOR UPDATE";

/// Locks the employee row behind a match and returns its current assignment.
/// Every writer of `current_project_id` calls this before touching the match
/// row, so the lock order is employee row, then match row.
async fn lock_match_employee(
    tx: &deadpool_postgres::Transaction<'_>,
    id: MatchId,
) -> Result<Option<i64>, StoreError> {
    let employee_id: i64 = tx
        .timed_query_opt(MATCH_EMPLOYEE_SQL, &[&id.0], "lock_match_employee.lookup")
        .await?
        .ok_or_else(|| StoreError::not_found("match", id))?
        .try_get(0)?;

    let assigned: Option<i64> = tx
        .timed_query_opt(LOCK_EMPLOYEE_SQL, &[&employee_id], "lock_match_employee.lock")
        .await?
        .ok_or_else(|| StoreError::not_found("employee", employee_id))?
        .try_get(0)?;

    Ok(assigned)
}

fn is_unique_violation(err: &PgError) -> bool {
    err.code() == Some(&SqlState::UNIQUE_VIOLATION)
}

fn employee_from_row(row: &Row) -> Result<Employee, StoreError> {
    let Json(skills): Json<Vec<SkillLevel>> = row.try_get("skills")?;
    let current_project: Option<i64> = row.try_get("current_project_id")?;

    Ok(Employee {
        id: EmployeeId(row.try_get("id")?),
        employee_code: row.try_get("employee_code")?,
        name: row.try_get("name")?,
        department: row.try_get("department")?,
        position: row.try_get("position")?,
        skills,
        experience_years: row.try_get("experience_years")?,
        availability: Availability {
            start: row.try_get("available_from")?,
            end: row.try_get("available_until")?,
        },
        current_project: current_project.map(ProjectId),
        skill_vector: row.try_get("skill_vector")?,
    })
}

fn project_from_row(row: &Row) -> Result<Project, StoreError> {
    let Json(required_skills): Json<Vec<SkillLevel>> = row.try_get("required_skills")?;
    let status: String = row.try_get("status")?;
    let status = ProjectStatus::parse(&status)
        .ok_or_else(|| StoreError::Mapping(format!("unknown project status {status}")))?;
    let team_size: i32 = row.try_get("team_size")?;
    let priority: i16 = row.try_get("priority")?;

    Ok(Project {
        id: ProjectId(row.try_get("id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        required_skills,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        status,
        manager_id: EmployeeId(row.try_get("manager_id")?),
        team_size: u32::try_from(team_size)
            .map_err(|_| StoreError::Mapping(format!("negative team_size {team_size}")))?,
        priority: u8::try_from(priority)
            .map_err(|_| StoreError::Mapping(format!("priority {priority} out of range")))?,
        skill_vector: row.try_get("skill_vector")?,
        created_at: row.try_get("created_at")?,
    })
}

fn match_status_from_row(row: &Row) -> Result<MatchStatus, StoreError> {
    let status: String = row.try_get("status")?;
    MatchStatus::parse(&status)
        .ok_or_else(|| StoreError::Mapping(format!("unknown match status {status}")))
}

fn score_basis_from_row(row: &Row) -> Result<ScoreBasis, StoreError> {
    let basis: String = row.try_get("score_basis")?;
    basis
        .parse::<ScoreBasis>()
        .map_err(|_| StoreError::Mapping(format!("unknown score basis {basis}")))
}

fn match_from_row(row: &Row) -> Result<Match, StoreError> {
    Ok(Match {
        id: MatchId(row.try_get("id")?),
        project_id: ProjectId(row.try_get("project_id")?),
        employee_id: EmployeeId(row.try_get("employee_id")?),
        match_score: row.try_get("match_score")?,
        skills_match_percentage: row.try_get("skills_match_percentage")?,
        score_basis: score_basis_from_row(row)?,
        availability_match: row.try_get("availability_match")?,
        status: match_status_from_row(row)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn feedback_from_row(row: &Row) -> Result<Feedback, StoreError> {
    let rating: i16 = row.try_get("rating")?;
    Ok(Feedback {
        id: FeedbackId(row.try_get("id")?),
        match_id: MatchId(row.try_get("match_id")?),
        rating: u8::try_from(rating)
            .map_err(|_| StoreError::Mapping(format!("rating {rating} out of range")))?,
        text: row.try_get("text")?,
        author_id: EmployeeId(row.try_get("author_id")?),
        created_at: row.try_get("created_at")?,
    })
}

fn team_size_param(project: &NewProject) -> Result<i32, StoreError> {
    i32::try_from(project.team_size)
        .map_err(|_| StoreError::Mapping(format!("team_size {} too large", project.team_size)))
}

/// Postgres-backed store over the `staffing` schema.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl MatchStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let client = self.pool.get().await?;
        client.timed_query_one("SELECT 1", &[], "ping").await?;
        Ok(())
    }

    #[instrument(skip(self, employee, skill_vector), fields(code = %employee.employee_code))]
    async fn insert_employee(
        &self,
        employee: &NewEmployee,
        skill_vector: Option<Vec<f32>>,
    ) -> Result<Employee, StoreError> {
        let client = self.pool.get().await?;
        let sql = format!(
            "INSERT INTO staffing.employees (
                employee_code, name, department, position, skills, experience_years,
                available_from, available_until, skill_vector
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {EMPLOYEE_COLUMNS}"
        );
        let skills = Json(&employee.skills);

        let row = client
            .timed_query_one(
                sql.as_str(),
                &[
                    &employee.employee_code,
                    &employee.name,
                    &employee.department,
                    &employee.position,
                    &skills,
                    &employee.experience_years,
                    &employee.availability.start,
                    &employee.availability.end,
                    &skill_vector,
                ],
                "insert_employee",
            )
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    StoreError::EmployeeCodeTaken(employee.employee_code.clone())
                } else {
                    StoreError::Postgres(err)
                }
            })?;

        employee_from_row(&row)
    }

    async fn get_employee(&self, id: EmployeeId) -> Result<Employee, StoreError> {
        let client = self.pool.get().await?;
        let sql = format!("SELECT {EMPLOYEE_COLUMNS} FROM staffing.employees WHERE id = $1");
        let row = client
            .timed_query_opt(sql.as_str(), &[&id.0], "get_employee")
            .await?
            .ok_or_else(|| StoreError::not_found("employee", id))?;
        employee_from_row(&row)
    }

    async fn list_employees(&self) -> Result<Vec<Employee>, StoreError> {
        let client = self.pool.get().await?;
        let sql = format!("SELECT {EMPLOYEE_COLUMNS} FROM staffing.employees ORDER BY id");
        let rows = client.timed_query(sql.as_str(), &[], "list_employees").await?;
        rows.iter().map(employee_from_row).collect()
    }

    #[instrument(skip(self, skills, skill_vector))]
    async fn update_employee_skills(
        &self,
        id: EmployeeId,
        skills: &[SkillLevel],
        skill_vector: Option<Vec<f32>>,
    ) -> Result<Employee, StoreError> {
        let client = self.pool.get().await?;
        let sql = format!(
            "UPDATE staffing.employees
             SET skills = $2, skill_vector = $3, updated_at = NOW()
             WHERE id = $1
             RETURNING {EMPLOYEE_COLUMNS}"
        );
        let skills = Json(skills);
        let row = client
            .timed_query_opt(
                sql.as_str(),
                &[&id.0, &skills, &skill_vector],
                "update_employee_skills",
            )
            .await?
            .ok_or_else(|| StoreError::not_found("employee", id))?;
        employee_from_row(&row)
    }

    #[instrument(skip(self, project, skill_vector), fields(title = %project.title))]
    async fn insert_project(
        &self,
        project: &NewProject,
        skill_vector: Option<Vec<f32>>,
    ) -> Result<Project, StoreError> {
        let client = self.pool.get().await?;
        let sql = format!(
            "INSERT INTO staffing.projects (
                title, description, required_skills, start_date, end_date, status,
                manager_id, team_size, priority, skill_vector
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {PROJECT_COLUMNS}"
        );
        let skills = Json(&project.required_skills);
        let team_size = team_size_param(project)?;
        let priority = i16::from(project.priority);

        let row = client
            .timed_query_one(
                sql.as_str(),
                &[
                    &project.title,
                    &project.description,
                    &skills,
                    &project.start_date,
                    &project.end_date,
                    &project.status.as_str(),
                    &project.manager_id.0,
                    &team_size,
                    &priority,
                    &skill_vector,
                ],
                "insert_project",
            )
            .await?;
        project_from_row(&row)
    }

    #[instrument(skip(self, project, skill_vector))]
    async fn update_project(
        &self,
        id: ProjectId,
        project: &NewProject,
        skill_vector: Option<Vec<f32>>,
    ) -> Result<Project, StoreError> {
        let client = self.pool.get().await?;
        let sql = format!(
            "UPDATE staffing.projects SET
                title = $2, description = $3, required_skills = $4, start_date = $5,
                end_date = $6, status = $7, manager_id = $8, team_size = $9,
                priority = $10, skill_vector = $11, updated_at = NOW()
             WHERE id = $1
             RETURNING {PROJECT_COLUMNS}"
        );
        let skills = Json(&project.required_skills);
        let team_size = team_size_param(project)?;
        let priority = i16::from(project.priority);

        let row = client
            .timed_query_opt(
                sql.as_str(),
                &[
                    &id.0,
                    &project.title,
                    &project.description,
                    &skills,
                    &project.start_date,
                    &project.end_date,
                    &project.status.as_str(),
                    &project.manager_id.0,
                    &team_size,
                    &priority,
                    &skill_vector,
                ],
                "update_project",
            )
            .await?
            .ok_or_else(|| StoreError::not_found("project", id))?;
        project_from_row(&row)
    }

    async fn get_project(&self, id: ProjectId) -> Result<Project, StoreError> {
        let client = self.pool.get().await?;
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM staffing.projects WHERE id = $1");
        let row = client
            .timed_query_opt(sql.as_str(), &[&id.0], "get_project")
            .await?
            .ok_or_else(|| StoreError::not_found("project", id))?;
        project_from_row(&row)
    }

    #[instrument(skip(self, candidates), fields(candidates = candidates.len()))]
    async fn upsert_matches(
        &self,
        project_id: ProjectId,
        candidates: &[ScoredCandidate],
    ) -> Result<UpsertSummary, StoreError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let stmt = tx.prepare_cached(UPSERT_MATCH_SQL).await?;
        let mut summary = UpsertSummary::default();

        for candidate in candidates {
            let row = tx
                .timed_query_opt(
                    &stmt,
                    &[
                        &project_id.0,
                        &candidate.employee_id.0,
                        &candidate.score,
                        &candidate.coverage_pct,
                        &candidate.basis.as_ref(),
                    ],
                    "upsert_match",
                )
                .await
                .map_err(|err| {
                    if is_unique_violation(&err) {
                        error!(
                            %project_id,
                            employee_id = %candidate.employee_id,
                            "unique violation during match upsert"
                        );
                        StoreError::DuplicateMatch {
                            project_id,
                            employee_id: candidate.employee_id,
                        }
                    } else {
                        StoreError::Postgres(err)
                    }
                })?;

            match row {
                Some(row) if row.try_get::<_, bool>("inserted")? => summary.inserted += 1,
                Some(_) => summary.updated += 1,
                None => summary.skipped_finalized += 1,
            }
        }

        tx.commit().await?;
        debug!(?summary, "match batch committed");
        Ok(summary)
    }

    async fn get_match(&self, id: MatchId) -> Result<Match, StoreError> {
        let client = self.pool.get().await?;
        let sql = format!("SELECT {MATCH_COLUMNS} FROM staffing.matches WHERE id = $1");
        let row = client
            .timed_query_opt(sql.as_str(), &[&id.0], "get_match")
            .await?
            .ok_or_else(|| StoreError::not_found("match", id))?;
        match_from_row(&row)
    }

    async fn list_matches(&self, project_id: ProjectId) -> Result<Vec<Match>, StoreError> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {MATCH_COLUMNS} FROM staffing.matches
             WHERE project_id = $1
             ORDER BY match_score DESC, employee_id ASC"
        );
        let rows = client
            .timed_query(sql.as_str(), &[&project_id.0], "list_matches")
            .await?;
        let mut listed = rows
            .iter()
            .map(match_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        rank_matches(&mut listed);
        Ok(listed)
    }

    #[instrument(skip(self))]
    async fn accept_match(&self, id: MatchId) -> Result<Match, StoreError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let assigned = lock_match_employee(&tx, id).await?;

        let sql = format!("SELECT {MATCH_COLUMNS} FROM staffing.matches WHERE id = $1 FOR UPDATE");
        let locked = tx
            .timed_query_opt(sql.as_str(), &[&id.0], "accept_match.lock_match")
            .await?
            .ok_or_else(|| StoreError::not_found("match", id))?;
        let locked = match_from_row(&locked)?;

        if locked.status != MatchStatus::Suggested {
            return Err(StoreError::StatusChanged {
                match_id: id,
                expected: MatchStatus::Suggested,
                actual: locked.status,
            });
        }
        if let Some(project_id) = assigned {
            return Err(StoreError::EmployeeAssigned {
                employee_id: locked.employee_id,
                project_id: ProjectId(project_id),
            });
        }

        let sql = format!(
            "UPDATE staffing.matches SET status = 'ACCEPTED', updated_at = NOW()
             WHERE id = $1
             RETURNING {MATCH_COLUMNS}"
        );
        let row = tx
            .timed_query_one(sql.as_str(), &[&id.0], "accept_match.update_match")
            .await?;
        let accepted = match_from_row(&row)?;

        tx.timed_execute(
            "UPDATE staffing.employees SET current_project_id = $2, updated_at = NOW()
             WHERE id = $1",
            &[&accepted.employee_id.0, &accepted.project_id.0],
            "accept_match.assign_employee",
        )
        .await?;

        tx.commit().await?;
        Ok(accepted)
    }

    #[instrument(skip(self))]
    async fn transition_match(
        &self,
        id: MatchId,
        from: MatchStatus,
        to: MatchStatus,
    ) -> Result<Match, StoreError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        if to == MatchStatus::Completed {
            lock_match_employee(&tx, id).await?;
        }

        let sql = format!(
            "UPDATE staffing.matches SET status = $3, updated_at = NOW()
             WHERE id = $1 AND status = $2
             RETURNING {MATCH_COLUMNS}"
        );
        let updated = tx
            .timed_query_opt(
                sql.as_str(),
                &[&id.0, &from.as_str(), &to.as_str()],
                "transition_match",
            )
            .await?;

        let Some(row) = updated else {
            let actual = tx
                .timed_query_opt(
                    "SELECT status FROM staffing.matches WHERE id = $1",
                    &[&id.0],
                    "transition_match.status",
                )
                .await?
                .ok_or_else(|| StoreError::not_found("match", id))?;
            return Err(StoreError::StatusChanged {
                match_id: id,
                expected: from,
                actual: match_status_from_row(&actual)?,
            });
        };
        let changed = match_from_row(&row)?;

        if to == MatchStatus::Completed {
            tx.timed_execute(
                "UPDATE staffing.employees SET current_project_id = NULL, updated_at = NOW()
                 WHERE id = $1 AND current_project_id = $2",
                &[&changed.employee_id.0, &changed.project_id.0],
                "transition_match.release_employee",
            )
            .await?;
        }

        tx.commit().await?;
        Ok(changed)
    }

    #[instrument(skip(self, feedback), fields(match_id = %feedback.match_id))]
    async fn insert_feedback(&self, feedback: &NewFeedback) -> Result<Feedback, StoreError> {
        let client = self.pool.get().await?;
        let sql = format!(
            "INSERT INTO staffing.match_feedback (match_id, rating, text, author_id)
             VALUES ($1, $2, $3, $4)
             RETURNING {FEEDBACK_COLUMNS}"
        );
        let rating = i16::from(feedback.rating);
        let row = client
            .timed_query_one(
                sql.as_str(),
                &[
                    &feedback.match_id.0,
                    &rating,
                    &feedback.text,
                    &feedback.author_id.0,
                ],
                "insert_feedback",
            )
            .await?;
        feedback_from_row(&row)
    }

    async fn list_feedback(&self, match_id: MatchId) -> Result<Vec<Feedback>, StoreError> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {FEEDBACK_COLUMNS} FROM staffing.match_feedback
             WHERE match_id = $1
             ORDER BY created_at, id"
        );
        let rows = client
            .timed_query(sql.as_str(), &[&match_id.0], "list_feedback")
            .await?;
        rows.iter().map(feedback_from_row).collect()
    }

    async fn current_project(
        &self,
        employee_id: EmployeeId,
    ) -> Result<Option<ProjectId>, StoreError> {
        let client = self.pool.get().await?;
        let current: Option<i64> = client
            .timed_query_opt(
                "SELECT current_project_id FROM staffing.employees WHERE id = $1",
                &[&employee_id.0],
                "current_project",
            )
            .await?
            .ok_or_else(|| StoreError::not_found("employee", employee_id))?
            .try_get(0)?;
        Ok(current.map(ProjectId))
    }
}
