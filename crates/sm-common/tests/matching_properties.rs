use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use sm_common::db::{MatchStore, MemoryStore};
use sm_common::embedding::{DisabledEmbedder, HashEmbedder, SkillEmbedder, SkillVectorBuilder};
use sm_common::matching::{ScoreBasis, is_available, score_candidate};
use sm_common::{
    Availability, Employee, EmployeeId, MatchAction, MatchStatus, MatchingError, MatchingService,
    NewEmployee, NewFeedback, NewProject, Project, ProjectId, ProjectStatus, SkillLevel,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn service_with(embedder: Arc<dyn SkillEmbedder>) -> (Arc<MemoryStore>, MatchingService) {
    let store = Arc::new(MemoryStore::new());
    let svc = MatchingService::new(
        store.clone(),
        SkillVectorBuilder::new(embedder, Duration::from_secs(1)),
    );
    (store, svc)
}

fn new_employee(code: &str, skills: Vec<SkillLevel>, end: Option<NaiveDate>) -> NewEmployee {
    NewEmployee {
        employee_code: code.into(),
        name: format!("Employee {code}"),
        department: "Engineering".into(),
        position: "Engineer".into(),
        skills,
        experience_years: 5.0,
        availability: Availability {
            start: date(2024, 1, 1),
            end,
        },
    }
}

fn new_project(title: &str, manager_id: EmployeeId, end: NaiveDate) -> NewProject {
    NewProject {
        title: title.into(),
        description: String::new(),
        required_skills: vec![SkillLevel::new("Python", 3), SkillLevel::new("SQL", 2)],
        start_date: date(2024, 2, 1),
        end_date: end,
        status: ProjectStatus::Planning,
        team_size: 3,
        priority: 2,
        manager_id,
    }
}

#[test]
fn scenario_a_coverage_without_vectors() {
    let project = Project {
        id: ProjectId(1),
        title: "Reporting".into(),
        description: String::new(),
        required_skills: vec![SkillLevel::new("Python", 3), SkillLevel::new("SQL", 2)],
        start_date: date(2024, 2, 1),
        end_date: date(2024, 5, 1),
        status: ProjectStatus::Planning,
        manager_id: EmployeeId(9),
        team_size: 1,
        priority: 1,
        skill_vector: None,
        created_at: Utc::now(),
    };
    let employee = Employee {
        id: EmployeeId(2),
        employee_code: "E-2".into(),
        name: "Sam".into(),
        department: "Data".into(),
        position: "Engineer".into(),
        skills: vec![SkillLevel::new("Python", 4)],
        experience_years: 6.0,
        availability: Availability {
            start: date(2024, 1, 1),
            end: None,
        },
        current_project: None,
        skill_vector: None,
    };

    let scored = score_candidate(&project, &employee);
    assert_eq!(scored.score, 0.5);
    assert_eq!(scored.coverage_pct, 50.0);
    assert_eq!(scored.basis, ScoreBasis::Coverage);
}

#[test]
fn scenario_b_availability_window() {
    let employee = Employee {
        id: EmployeeId(1),
        employee_code: "E-1".into(),
        name: "Kai".into(),
        department: String::new(),
        position: String::new(),
        skills: vec![],
        experience_years: 1.0,
        availability: Availability {
            start: date(2024, 1, 1),
            end: Some(date(2024, 6, 1)),
        },
        current_project: None,
        skill_vector: None,
    };
    let mut project = Project {
        id: ProjectId(1),
        title: "Window".into(),
        description: String::new(),
        required_skills: vec![],
        start_date: date(2024, 2, 1),
        end_date: date(2024, 5, 1),
        status: ProjectStatus::Planning,
        manager_id: EmployeeId(9),
        team_size: 1,
        priority: 1,
        skill_vector: None,
        created_at: Utc::now(),
    };

    assert!(is_available(&employee, &project));

    project.end_date = date(2024, 7, 1);
    assert!(!is_available(&employee, &project));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scenario_c_concurrent_accepts_have_one_winner() {
    let (_, svc) = service_with(Arc::new(DisabledEmbedder));
    let svc = Arc::new(svc);
    let manager_a = svc
        .register_employee(new_employee("MA", vec![], Some(date(2024, 1, 2))))
        .await
        .unwrap();
    let manager_b = svc
        .register_employee(new_employee("MB", vec![], Some(date(2024, 1, 2))))
        .await
        .unwrap();
    let shared = svc
        .register_employee(new_employee("X", vec![SkillLevel::new("Python", 5)], None))
        .await
        .unwrap();

    let first = svc
        .create_project(new_project("Alpha", manager_a.id, date(2024, 5, 1)))
        .await
        .unwrap();
    let second = svc
        .create_project(new_project("Beta", manager_b.id, date(2024, 5, 1)))
        .await
        .unwrap();
    assert_eq!(first.matches.len(), 1);
    assert_eq!(second.matches.len(), 1);

    let a = {
        let svc = Arc::clone(&svc);
        let id = first.matches[0].match_id;
        tokio::spawn(async move { svc.transition(id, MatchAction::Accept, manager_a.id).await })
    };
    let b = {
        let svc = Arc::clone(&svc);
        let id = second.matches[0].match_id;
        tokio::spawn(async move { svc.transition(id, MatchAction::Accept, manager_b.id).await })
    };
    let results = [a.await.unwrap(), b.await.unwrap()];

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    let loser_err = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(matches!(loser_err, MatchingError::Conflict(_)), "{loser_err:?}");

    let winner_project = winners[0].project_id;
    assert_eq!(svc.current_project(shared.id).await.unwrap(), Some(winner_project));

    let loser_project = if winner_project == first.project.id {
        second.project.id
    } else {
        first.project.id
    };
    let listed = svc.list_matches(loser_project).await.unwrap();
    assert_eq!(listed[0].status, MatchStatus::Suggested);
}

#[tokio::test]
async fn scenario_d_out_of_range_rating_is_rejected() {
    let (store, svc) = service_with(Arc::new(DisabledEmbedder));
    let manager = svc
        .register_employee(new_employee("M", vec![], None))
        .await
        .unwrap();
    let created = svc
        .create_project(new_project("Gamma", manager.id, date(2024, 5, 1)))
        .await
        .unwrap();
    let match_id = created.matches[0].match_id;
    svc.transition(match_id, MatchAction::Accept, manager.id)
        .await
        .unwrap();

    let err = svc
        .submit_feedback(NewFeedback {
            match_id,
            rating: 6,
            text: "excellent".into(),
            author_id: manager.id,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, MatchingError::Validation(ref v) if v.field == "rating"));
    assert!(store.list_feedback(match_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn recompute_is_idempotent_and_keeps_pairs_unique() {
    let (store, svc) = service_with(Arc::new(HashEmbedder::new(64)));
    let manager = svc
        .register_employee(new_employee("M", vec![SkillLevel::new("Excel", 2)], None))
        .await
        .unwrap();
    for (code, skills) in [
        ("P", vec![SkillLevel::new("Python", 4)]),
        ("Q", vec![SkillLevel::new("SQL", 3), SkillLevel::new("Python", 3)]),
        ("R", vec![SkillLevel::new("Go", 5)]),
    ] {
        svc.register_employee(new_employee(code, skills, None))
            .await
            .unwrap();
    }
    // Leaves before the project ends.
    svc.register_employee(new_employee(
        "Early",
        vec![SkillLevel::new("Python", 5)],
        Some(date(2024, 3, 1)),
    ))
    .await
    .unwrap();

    let created = svc
        .create_project(new_project("Delta", manager.id, date(2024, 5, 1)))
        .await
        .unwrap();
    let project_id = created.project.id;
    let before = store.list_matches(project_id).await.unwrap();

    let mut eligible_counts = Vec::new();
    for _ in 0..3 {
        let outcome = svc.recompute(project_id).await.unwrap();
        assert_eq!(outcome.summary.inserted, 0);
        eligible_counts.push(outcome.candidates.len());
    }
    let after = store.list_matches(project_id).await.unwrap();

    assert_eq!(before.len(), 4);
    assert!(after.len() <= *eligible_counts.iter().max().unwrap());
    let pairs: HashSet<_> = after.iter().map(|m| (m.project_id, m.employee_id)).collect();
    assert_eq!(pairs.len(), after.len());

    for (old, new) in before.iter().zip(&after) {
        assert_eq!(old.id, new.id);
        assert_eq!(old.match_score, new.match_score);
        assert_eq!(old.skills_match_percentage, new.skills_match_percentage);
        assert_eq!(old.status, new.status);
        assert!(new.availability_match);
    }
}

#[tokio::test]
async fn ineligible_employees_are_never_touched_by_recompute() {
    let (store, svc) = service_with(Arc::new(DisabledEmbedder));
    let manager = svc
        .register_employee(new_employee("M", vec![], Some(date(2024, 1, 2))))
        .await
        .unwrap();
    let worker = svc
        .register_employee(new_employee("W", vec![SkillLevel::new("Python", 3)], None))
        .await
        .unwrap();

    let first = svc
        .create_project(new_project("First", manager.id, date(2024, 5, 1)))
        .await
        .unwrap();
    let second = svc
        .create_project(new_project("Second", manager.id, date(2024, 5, 1)))
        .await
        .unwrap();
    let original = first.matches[0].clone();

    svc.transition(second.matches[0].match_id, MatchAction::Accept, manager.id)
        .await
        .unwrap();
    svc.update_employee_skills(
        worker.id,
        vec![SkillLevel::new("Python", 5), SkillLevel::new("SQL", 5)],
    )
    .await
    .unwrap();

    let outcome = svc.recompute(first.project.id).await.unwrap();
    assert!(outcome.candidates.is_empty());

    let current = store.get_match(original.match_id).await.unwrap();
    assert_eq!(current.match_score, original.match_score);
    assert_eq!(current.skills_match_percentage, original.skills_match_percentage);
    assert_eq!(current.status, MatchStatus::Suggested);
}

#[tokio::test]
async fn missing_vectors_score_exactly_on_coverage() {
    let (_, svc) = service_with(Arc::new(DisabledEmbedder));
    let manager = svc
        .register_employee(new_employee("M", vec![], None))
        .await
        .unwrap();
    svc.register_employee(new_employee(
        "Half",
        vec![SkillLevel::new("python", 3), SkillLevel::new("SQL", 1)],
        None,
    ))
    .await
    .unwrap();

    let created = svc
        .create_project(new_project("Epsilon", manager.id, date(2024, 5, 1)))
        .await
        .unwrap();
    let outcome = svc.recompute(created.project.id).await.unwrap();

    for candidate in &outcome.candidates {
        assert_eq!(candidate.basis, ScoreBasis::Coverage);
        assert_eq!(candidate.score * 100.0, candidate.coverage_pct);
    }
    assert_eq!(outcome.candidates[0].score, 0.5);
}

#[tokio::test]
async fn stored_ranking_never_mixes_cosine_and_coverage() {
    let store = Arc::new(MemoryStore::new());
    let with_oracle = MatchingService::new(
        store.clone(),
        SkillVectorBuilder::new(Arc::new(HashEmbedder::new(64)), Duration::from_secs(1)),
    );
    let without_oracle = MatchingService::new(
        store.clone(),
        SkillVectorBuilder::new(Arc::new(DisabledEmbedder), Duration::from_secs(1)),
    );

    let manager = with_oracle
        .register_employee(new_employee("M", vec![], Some(date(2024, 1, 2))))
        .await
        .unwrap();
    let unrelated = with_oracle
        .register_employee(new_employee("A", vec![SkillLevel::new("Go", 5)], None))
        .await
        .unwrap();
    let python = with_oracle
        .register_employee(new_employee("B", vec![SkillLevel::new("Python", 3)], None))
        .await
        .unwrap();

    let created = with_oracle
        .create_project(new_project("Zeta", manager.id, date(2024, 5, 1)))
        .await
        .unwrap();
    assert!(created.matches.iter().all(|m| m.score_basis == ScoreBasis::Cosine));
    let rejected = created
        .matches
        .iter()
        .find(|m| m.employee_id == unrelated.id)
        .unwrap();
    with_oracle
        .transition(rejected.match_id, MatchAction::Reject, manager.id)
        .await
        .unwrap();

    // Registered while the oracle is off, so the next pass falls back to coverage.
    let late = without_oracle
        .register_employee(new_employee("C", vec![SkillLevel::new("Python", 4)], None))
        .await
        .unwrap();
    let outcome = without_oracle.recompute(created.project.id).await.unwrap();
    assert!(outcome.candidates.iter().all(|c| c.basis == ScoreBasis::Coverage));
    assert_eq!(outcome.summary.skipped_finalized, 1);

    let listed = without_oracle.list_matches(created.project.id).await.unwrap();
    let order: Vec<_> = listed.iter().map(|m| m.employee_id).collect();
    assert_eq!(order, vec![python.id, late.id, unrelated.id]);

    let finalized = &listed[2];
    assert_eq!(finalized.status, MatchStatus::Rejected);
    assert_eq!(finalized.score_basis, ScoreBasis::Cosine);
    assert_eq!(finalized.skills_match_percentage, 0.0);
    assert!(listed[..2]
        .iter()
        .all(|m| m.score_basis == ScoreBasis::Coverage && m.skills_match_percentage == 50.0));
}
