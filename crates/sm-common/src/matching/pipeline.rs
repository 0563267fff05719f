use std::cmp::Ordering;

use tracing::{debug, info};

use super::{
    prefilter::eligible_employees,
    scoring::{ScoreBasis, ScoredCandidate, score_by_coverage, score_candidate},
};
use crate::{
    model::{Employee, EmployeeId, Match, Project, ProjectId},
    run_id,
};

/// Result of filtering and scoring every employee for one project.
#[derive(Debug, Clone)]
pub struct MatchingPass {
    pub project_id: ProjectId,
    pub run_id: String,
    /// Employees looked at before the availability filter.
    pub considered: usize,
    /// Ranked: score descending, then employee id ascending.
    pub candidates: Vec<ScoredCandidate>,
}

/// Display order for matches within one project. `total_cmp` keeps the
/// order total; a NaN score sorts ahead of every finite one.
pub fn rank_order(
    a_score: f64,
    a_employee: EmployeeId,
    b_score: f64,
    b_employee: EmployeeId,
) -> Ordering {
    b_score
        .total_cmp(&a_score)
        .then_with(|| a_employee.cmp(&b_employee))
}

/// Order stored matches for display.
///
/// Rows keep the basis of the pass that last wrote them, and finalized or
/// no-longer-eligible rows are not rewritten. When a listing holds both
/// bases every row is ranked on coverage, the rule `run_matching_pass`
/// applies within a single pass.
pub fn rank_matches(matches: &mut [Match]) {
    let mixed = matches.iter().any(|m| m.score_basis == ScoreBasis::Cosine)
        && matches.iter().any(|m| m.score_basis == ScoreBasis::Coverage);

    if mixed {
        matches.sort_by(|a, b| {
            rank_order(
                a.skills_match_percentage / 100.0,
                a.employee_id,
                b.skills_match_percentage / 100.0,
                b.employee_id,
            )
        });
    } else {
        matches.sort_by(|a, b| rank_order(a.match_score, a.employee_id, b.match_score, b.employee_id));
    }
}

pub fn rank_candidates(candidates: &mut [ScoredCandidate]) {
    candidates.sort_by(|a, b| rank_order(a.score, a.employee_id, b.score, b.employee_id));
}

/// Availability filter followed by scoring for every eligible employee.
/// No I/O; persistence happens in the caller.
pub fn run_matching_pass(project: &Project, employees: &[Employee]) -> MatchingPass {
    let run_id = run_id::generate();
    let eligible = eligible_employees(project, employees);

    let mut candidates: Vec<_> = eligible
        .iter()
        .map(|employee| score_candidate(project, employee))
        .collect();

    // One ranking, one scale: if any candidate lacks a usable vector, the
    // whole pass falls back to coverage.
    let mixed = candidates.iter().any(|c| c.basis == ScoreBasis::Cosine)
        && candidates.iter().any(|c| c.basis == ScoreBasis::Coverage);
    if mixed {
        info!(
            %run_id,
            project_id = %project.id,
            "skill vectors missing for some candidates; ranking on coverage"
        );
        candidates = eligible
            .iter()
            .map(|employee| score_by_coverage(project, employee))
            .collect();
    }
    rank_candidates(&mut candidates);

    for candidate in &candidates {
        debug!(
            %run_id,
            project_id = %project.id,
            employee_id = %candidate.employee_id,
            score = candidate.score,
            coverage_pct = candidate.coverage_pct,
            basis = ?candidate.basis,
            "scored candidate"
        );
    }

    if candidates.is_empty() {
        info!(
            %run_id,
            project_id = %project.id,
            considered = employees.len(),
            "no eligible candidates"
        );
    }

    MatchingPass {
        project_id: project.id,
        run_id,
        considered: employees.len(),
        candidates,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::*;
    use crate::model::{Availability, MatchId, MatchStatus, ProjectStatus, SkillLevel};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn base_project() -> Project {
        Project {
            id: ProjectId(10),
            title: "Reporting".into(),
            description: String::new(),
            required_skills: vec![SkillLevel::new("Python", 3), SkillLevel::new("SQL", 2)],
            start_date: date(2024, 2, 1),
            end_date: date(2024, 5, 1),
            status: ProjectStatus::Planning,
            manager_id: EmployeeId(100),
            team_size: 2,
            priority: 2,
            skill_vector: None,
            created_at: Utc::now(),
        }
    }

    fn employee(id: i64, skills: Vec<SkillLevel>) -> Employee {
        Employee {
            id: EmployeeId(id),
            employee_code: format!("E-{id}"),
            name: format!("Employee {id}"),
            department: "Eng".into(),
            position: "Dev".into(),
            skills,
            experience_years: 3.0,
            availability: Availability {
                start: date(2024, 1, 1),
                end: None,
            },
            current_project: None,
            skill_vector: None,
        }
    }

    #[test]
    fn ranks_by_score_then_employee_id() {
        let employees = vec![
            employee(3, vec![SkillLevel::new("Python", 4)]),
            employee(1, vec![SkillLevel::new("SQL", 5)]),
            employee(2, vec![SkillLevel::new("Python", 3), SkillLevel::new("SQL", 2)]),
        ];

        let pass = run_matching_pass(&base_project(), &employees);

        let order: Vec<_> = pass.candidates.iter().map(|c| c.employee_id.0).collect();
        assert_eq!(order, vec![2, 1, 3]);
        assert_eq!(pass.candidates[0].score, 1.0);
        assert!(pass.candidates.iter().all(|c| c.basis == ScoreBasis::Coverage));
        assert_eq!(pass.considered, 3);
    }

    #[test]
    fn skips_ineligible_employees() {
        let mut assigned = employee(1, vec![SkillLevel::new("Python", 5)]);
        assigned.current_project = Some(ProjectId(4));
        let mut short_window = employee(2, vec![SkillLevel::new("Python", 5)]);
        short_window.availability.end = Some(date(2024, 3, 1));

        let pass = run_matching_pass(&base_project(), &[assigned, short_window]);

        assert!(pass.candidates.is_empty());
        assert_eq!(pass.considered, 2);
        assert_eq!(pass.project_id, ProjectId(10));
    }

    #[test]
    fn partial_vectors_rank_every_candidate_on_coverage() {
        let mut project = base_project();
        project.skill_vector = Some(vec![1.0, 0.0]);

        let mut with_vector = employee(1, vec![SkillLevel::new("Python", 1)]);
        with_vector.skill_vector = Some(vec![1.0, 0.0]);
        let without_vector = employee(2, vec![SkillLevel::new("Python", 3), SkillLevel::new("SQL", 2)]);

        let pass = run_matching_pass(&project, &[with_vector, without_vector]);

        assert!(pass.candidates.iter().all(|c| c.basis == ScoreBasis::Coverage));
        let order: Vec<_> = pass.candidates.iter().map(|c| (c.employee_id.0, c.score)).collect();
        assert_eq!(order, vec![(2, 1.0), (1, 0.0)]);
    }

    #[test]
    fn full_vectors_rank_on_cosine() {
        let mut project = base_project();
        project.skill_vector = Some(vec![1.0, 0.0]);

        let mut aligned = employee(1, vec![]);
        aligned.skill_vector = Some(vec![1.0, 0.0]);
        let mut orthogonal = employee(2, vec![SkillLevel::new("Python", 5), SkillLevel::new("SQL", 5)]);
        orthogonal.skill_vector = Some(vec![0.0, 1.0]);

        let pass = run_matching_pass(&project, &[orthogonal, aligned]);

        assert!(pass.candidates.iter().all(|c| c.basis == ScoreBasis::Cosine));
        assert_eq!(pass.candidates[0].employee_id, EmployeeId(1));
        assert_eq!(pass.candidates[1].coverage_pct, 100.0);
    }

    #[test]
    fn run_ids_differ_between_passes() {
        let employees = vec![employee(1, vec![])];
        let first = run_matching_pass(&base_project(), &employees);
        let second = run_matching_pass(&base_project(), &employees);
        assert_ne!(first.run_id, second.run_id);
    }

    fn stored(employee: i64, score: f64, coverage_pct: f64, score_basis: ScoreBasis) -> Match {
        Match {
            id: MatchId(employee),
            project_id: ProjectId(10),
            employee_id: EmployeeId(employee),
            match_score: score,
            skills_match_percentage: coverage_pct,
            score_basis,
            availability_match: true,
            status: MatchStatus::Suggested,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn stored_matches_with_one_basis_rank_on_score() {
        let mut listed = vec![
            stored(1, 0.2, 100.0, ScoreBasis::Cosine),
            stored(2, 0.9, 0.0, ScoreBasis::Cosine),
            stored(3, 0.9, 50.0, ScoreBasis::Cosine),
        ];

        rank_matches(&mut listed);

        let order: Vec<_> = listed.iter().map(|m| m.employee_id.0).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn stored_matches_with_mixed_bases_rank_on_coverage() {
        let mut listed = vec![
            stored(1, 0.0, 0.0, ScoreBasis::Coverage),
            stored(2, 0.98, 0.0, ScoreBasis::Cosine),
            stored(6, 0.5, 50.0, ScoreBasis::Coverage),
            stored(4, 0.1, 100.0, ScoreBasis::Cosine),
        ];

        rank_matches(&mut listed);

        let order: Vec<_> = listed.iter().map(|m| m.employee_id.0).collect();
        assert_eq!(order, vec![4, 6, 1, 2]);
    }

    #[test]
    fn nan_scores_have_a_fixed_place() {
        let mut candidates = vec![
            ScoredCandidate {
                employee_id: EmployeeId(1),
                score: 0.5,
                coverage_pct: 50.0,
                basis: ScoreBasis::Coverage,
            },
            ScoredCandidate {
                employee_id: EmployeeId(2),
                score: f64::NAN,
                coverage_pct: 0.0,
                basis: ScoreBasis::Coverage,
            },
            ScoredCandidate {
                employee_id: EmployeeId(3),
                score: 1.0,
                coverage_pct: 100.0,
                basis: ScoreBasis::Coverage,
            },
        ];

        rank_candidates(&mut candidates);

        let order: Vec<_> = candidates.iter().map(|c| c.employee_id.0).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }
}
