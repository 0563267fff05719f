use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::error;

use crate::db::store::{MatchStore, StoreError, UpsertSummary};
use crate::matching::ScoredCandidate;
use crate::model::{
    Employee, EmployeeId, Feedback, FeedbackId, Match, MatchId, MatchStatus, NewEmployee,
    NewFeedback, NewProject, Project, ProjectId, SkillLevel,
};

#[derive(Default)]
struct Tables {
    employees: BTreeMap<EmployeeId, Employee>,
    projects: BTreeMap<ProjectId, Project>,
    matches: BTreeMap<MatchId, Match>,
    pairs: HashMap<(ProjectId, EmployeeId), MatchId>,
    feedback: Vec<Feedback>,
    last_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn employee_mut(&mut self, id: EmployeeId) -> Result<&mut Employee, StoreError> {
        self.employees
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("employee", id))
    }

    fn match_ref(&self, id: MatchId) -> Result<&Match, StoreError> {
        self.matches
            .get(&id)
            .ok_or_else(|| StoreError::not_found("match", id))
    }
}

/// In-process store. One lock guards every table, so each call is atomic
/// with respect to every other.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MatchStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert_employee(
        &self,
        employee: &NewEmployee,
        skill_vector: Option<Vec<f32>>,
    ) -> Result<Employee, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables
            .employees
            .values()
            .any(|existing| existing.employee_code == employee.employee_code)
        {
            return Err(StoreError::EmployeeCodeTaken(employee.employee_code.clone()));
        }

        let id = EmployeeId(tables.next_id());
        let stored = Employee {
            id,
            employee_code: employee.employee_code.clone(),
            name: employee.name.clone(),
            department: employee.department.clone(),
            position: employee.position.clone(),
            skills: employee.skills.clone(),
            experience_years: employee.experience_years,
            availability: employee.availability,
            current_project: None,
            skill_vector,
        };
        tables.employees.insert(id, stored.clone());
        Ok(stored)
    }

    async fn get_employee(&self, id: EmployeeId) -> Result<Employee, StoreError> {
        let tables = self.tables.lock().await;
        tables
            .employees
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("employee", id))
    }

    async fn list_employees(&self) -> Result<Vec<Employee>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.employees.values().cloned().collect())
    }

    async fn update_employee_skills(
        &self,
        id: EmployeeId,
        skills: &[SkillLevel],
        skill_vector: Option<Vec<f32>>,
    ) -> Result<Employee, StoreError> {
        let mut tables = self.tables.lock().await;
        let employee = tables.employee_mut(id)?;
        employee.skills = skills.to_vec();
        employee.skill_vector = skill_vector;
        Ok(employee.clone())
    }

    async fn insert_project(
        &self,
        project: &NewProject,
        skill_vector: Option<Vec<f32>>,
    ) -> Result<Project, StoreError> {
        let mut tables = self.tables.lock().await;
        let id = ProjectId(tables.next_id());
        let stored = Project {
            id,
            title: project.title.clone(),
            description: project.description.clone(),
            required_skills: project.required_skills.clone(),
            start_date: project.start_date,
            end_date: project.end_date,
            status: project.status.clone(),
            manager_id: project.manager_id,
            team_size: project.team_size,
            priority: project.priority,
            skill_vector,
            created_at: Utc::now(),
        };
        tables.projects.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update_project(
        &self,
        id: ProjectId,
        project: &NewProject,
        skill_vector: Option<Vec<f32>>,
    ) -> Result<Project, StoreError> {
        let mut tables = self.tables.lock().await;
        let stored = tables
            .projects
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("project", id))?;

        stored.title = project.title.clone();
        stored.description = project.description.clone();
        stored.required_skills = project.required_skills.clone();
        stored.start_date = project.start_date;
        stored.end_date = project.end_date;
        stored.status = project.status.clone();
        stored.manager_id = project.manager_id;
        stored.team_size = project.team_size;
        stored.priority = project.priority;
        stored.skill_vector = skill_vector;
        Ok(stored.clone())
    }

    async fn get_project(&self, id: ProjectId) -> Result<Project, StoreError> {
        let tables = self.tables.lock().await;
        tables
            .projects
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("project", id))
    }

    async fn upsert_matches(
        &self,
        project_id: ProjectId,
        candidates: &[ScoredCandidate],
    ) -> Result<UpsertSummary, StoreError> {
        let mut tables = self.tables.lock().await;
        if !tables.projects.contains_key(&project_id) {
            return Err(StoreError::not_found("project", project_id));
        }

        // Build the batch on a copy so a failure part way leaves nothing behind.
        let mut matches = tables.matches.clone();
        let mut pairs = tables.pairs.clone();
        let mut last_id = tables.last_id;
        let mut summary = UpsertSummary::default();
        let now = Utc::now();

        for candidate in candidates {
            let key = (project_id, candidate.employee_id);
            match pairs.get(&key).and_then(|id| matches.get_mut(id)) {
                Some(existing) if existing.status == MatchStatus::Suggested => {
                    existing.match_score = candidate.score;
                    existing.skills_match_percentage = candidate.coverage_pct;
                    existing.score_basis = candidate.basis;
                    existing.availability_match = true;
                    existing.updated_at = now;
                    summary.updated += 1;
                }
                Some(_) => summary.skipped_finalized += 1,
                None if pairs.contains_key(&key) => {
                    error!(%project_id, employee_id = %candidate.employee_id, "pair index points at a missing match");
                    return Err(StoreError::DuplicateMatch {
                        project_id,
                        employee_id: candidate.employee_id,
                    });
                }
                None => {
                    last_id += 1;
                    let id = MatchId(last_id);
                    matches.insert(
                        id,
                        Match {
                            id,
                            project_id,
                            employee_id: candidate.employee_id,
                            match_score: candidate.score,
                            skills_match_percentage: candidate.coverage_pct,
                            score_basis: candidate.basis,
                            availability_match: true,
                            status: MatchStatus::Suggested,
                            created_at: now,
                            updated_at: now,
                        },
                    );
                    pairs.insert(key, id);
                    summary.inserted += 1;
                }
            }
        }

        tables.matches = matches;
        tables.pairs = pairs;
        tables.last_id = last_id;
        Ok(summary)
    }

    async fn get_match(&self, id: MatchId) -> Result<Match, StoreError> {
        let tables = self.tables.lock().await;
        tables.match_ref(id).cloned()
    }

    async fn list_matches(&self, project_id: ProjectId) -> Result<Vec<Match>, StoreError> {
        let tables = self.tables.lock().await;
        let mut listed: Vec<Match> = tables
            .matches
            .values()
            .filter(|m| m.project_id == project_id)
            .cloned()
            .collect();
        crate::matching::rank_matches(&mut listed);
        Ok(listed)
    }

    async fn accept_match(&self, id: MatchId) -> Result<Match, StoreError> {
        let mut tables = self.tables.lock().await;
        let current = tables.match_ref(id)?.clone();

        if current.status != MatchStatus::Suggested {
            return Err(StoreError::StatusChanged {
                match_id: id,
                expected: MatchStatus::Suggested,
                actual: current.status,
            });
        }

        let employee = tables.employee_mut(current.employee_id)?;
        if let Some(project_id) = employee.current_project {
            return Err(StoreError::EmployeeAssigned {
                employee_id: current.employee_id,
                project_id,
            });
        }
        employee.current_project = Some(current.project_id);

        let stored = tables
            .matches
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("match", id))?;
        stored.status = MatchStatus::Accepted;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn transition_match(
        &self,
        id: MatchId,
        from: MatchStatus,
        to: MatchStatus,
    ) -> Result<Match, StoreError> {
        let mut tables = self.tables.lock().await;
        let stored = tables
            .matches
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("match", id))?;

        if stored.status != from {
            return Err(StoreError::StatusChanged {
                match_id: id,
                expected: from,
                actual: stored.status,
            });
        }
        stored.status = to;
        stored.updated_at = Utc::now();
        let changed = stored.clone();

        if to == MatchStatus::Completed {
            if let Some(employee) = tables.employees.get_mut(&changed.employee_id) {
                if employee.current_project == Some(changed.project_id) {
                    employee.current_project = None;
                }
            }
        }

        Ok(changed)
    }

    async fn insert_feedback(&self, feedback: &NewFeedback) -> Result<Feedback, StoreError> {
        let mut tables = self.tables.lock().await;
        tables.match_ref(feedback.match_id)?;

        let stored = Feedback {
            id: FeedbackId(tables.next_id()),
            match_id: feedback.match_id,
            rating: feedback.rating,
            text: feedback.text.clone(),
            author_id: feedback.author_id,
            created_at: Utc::now(),
        };
        tables.feedback.push(stored.clone());
        Ok(stored)
    }

    async fn list_feedback(&self, match_id: MatchId) -> Result<Vec<Feedback>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .feedback
            .iter()
            .filter(|f| f.match_id == match_id)
            .cloned()
            .collect())
    }

    async fn current_project(
        &self,
        employee_id: EmployeeId,
    ) -> Result<Option<ProjectId>, StoreError> {
        let tables = self.tables.lock().await;
        tables
            .employees
            .get(&employee_id)
            .map(|e| e.current_project)
            .ok_or_else(|| StoreError::not_found("employee", employee_id))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use super::*;
    use crate::matching::ScoreBasis;
    use crate::model::{Availability, ProjectStatus};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn new_employee(code: &str) -> NewEmployee {
        NewEmployee {
            employee_code: code.into(),
            name: format!("Employee {code}"),
            department: "Engineering".into(),
            position: "Developer".into(),
            skills: vec![SkillLevel::new("Rust", 4)],
            experience_years: 4.0,
            availability: Availability {
                start: date(2024, 1, 1),
                end: None,
            },
        }
    }

    fn new_project(manager: EmployeeId) -> NewProject {
        NewProject {
            title: "Ledger".into(),
            description: String::new(),
            required_skills: vec![SkillLevel::new("Rust", 3)],
            start_date: date(2024, 2, 1),
            end_date: date(2024, 6, 1),
            status: ProjectStatus::Planning,
            team_size: 2,
            priority: 2,
            manager_id: manager,
        }
    }

    fn candidate(employee_id: EmployeeId, score: f64) -> ScoredCandidate {
        ScoredCandidate {
            employee_id,
            score,
            coverage_pct: 100.0,
            basis: ScoreBasis::Coverage,
        }
    }

    #[tokio::test]
    async fn employee_codes_are_unique() {
        let store = MemoryStore::new();
        store.insert_employee(&new_employee("E-1"), None).await.unwrap();
        let err = store
            .insert_employee(&new_employee("E-1"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::EmployeeCodeTaken(code) if code == "E-1"));
    }

    #[tokio::test]
    async fn upsert_updates_in_place_and_skips_finalized() {
        let store = MemoryStore::new();
        let a = store.insert_employee(&new_employee("A"), None).await.unwrap();
        let b = store.insert_employee(&new_employee("B"), None).await.unwrap();
        let project = store.insert_project(&new_project(a.id), None).await.unwrap();

        let first = store
            .upsert_matches(project.id, &[candidate(a.id, 0.5), candidate(b.id, 0.4)])
            .await
            .unwrap();
        assert_eq!(first, UpsertSummary { inserted: 2, updated: 0, skipped_finalized: 0 });

        let listed = store.list_matches(project.id).await.unwrap();
        let rejected = listed.iter().find(|m| m.employee_id == b.id).unwrap();
        store
            .transition_match(rejected.id, MatchStatus::Suggested, MatchStatus::Rejected)
            .await
            .unwrap();

        let second = store
            .upsert_matches(project.id, &[candidate(a.id, 0.9), candidate(b.id, 0.95)])
            .await
            .unwrap();
        assert_eq!(second, UpsertSummary { inserted: 0, updated: 1, skipped_finalized: 1 });

        let listed = store.list_matches(project.id).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].employee_id, a.id);
        assert_eq!(listed[0].match_score, 0.9);
        assert_eq!(listed[1].match_score, 0.4);
        assert_eq!(listed[1].status, MatchStatus::Rejected);
    }

    #[tokio::test]
    async fn upsert_requires_existing_project() {
        let store = MemoryStore::new();
        let err = store
            .upsert_matches(ProjectId(99), &[candidate(EmployeeId(1), 0.1)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "project", id: 99 }));
    }

    #[tokio::test]
    async fn accept_assigns_and_complete_releases() {
        let store = MemoryStore::new();
        let e = store.insert_employee(&new_employee("A"), None).await.unwrap();
        let project = store.insert_project(&new_project(e.id), None).await.unwrap();
        store
            .upsert_matches(project.id, &[candidate(e.id, 0.7)])
            .await
            .unwrap();
        let m = store.list_matches(project.id).await.unwrap().remove(0);

        let accepted = store.accept_match(m.id).await.unwrap();
        assert_eq!(accepted.status, MatchStatus::Accepted);
        assert_eq!(store.current_project(e.id).await.unwrap(), Some(project.id));

        let err = store.accept_match(m.id).await.unwrap_err();
        assert!(matches!(err, StoreError::StatusChanged { actual: MatchStatus::Accepted, .. }));

        store
            .transition_match(m.id, MatchStatus::Accepted, MatchStatus::Completed)
            .await
            .unwrap();
        assert_eq!(store.current_project(e.id).await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_accepts_for_one_employee_have_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let e = store.insert_employee(&new_employee("A"), None).await.unwrap();

        let mut match_ids = Vec::new();
        for _ in 0..8 {
            let project = store.insert_project(&new_project(e.id), None).await.unwrap();
            store
                .upsert_matches(project.id, &[candidate(e.id, 0.5)])
                .await
                .unwrap();
            match_ids.push(store.list_matches(project.id).await.unwrap()[0].id);
        }

        let handles: Vec<_> = match_ids
            .iter()
            .map(|id| {
                let store = Arc::clone(&store);
                let id = *id;
                tokio::spawn(async move { store.accept_match(id).await })
            })
            .collect();

        let mut winners = Vec::new();
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(m) => winners.push(m),
                Err(StoreError::EmployeeAssigned { .. }) => conflicts += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(winners.len(), 1);
        assert_eq!(conflicts, 7);
        assert_eq!(
            store.current_project(e.id).await.unwrap(),
            Some(winners[0].project_id)
        );
    }

    #[tokio::test]
    async fn feedback_needs_an_existing_match() {
        let store = MemoryStore::new();
        let err = store
            .insert_feedback(&NewFeedback {
                match_id: MatchId(5),
                rating: 4,
                text: "good".into(),
                author_id: EmployeeId(1),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "match", .. }));
    }
}
