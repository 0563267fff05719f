use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use super::{similarity::cosine_similarity, skills::skill_coverage};
use crate::model::{Employee, EmployeeId, Project};

/// Which representation `score` is expressed in. Rankings never mix the two
/// as if they were on one scale; the basis travels with each score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScoreBasis {
    /// Cosine similarity of the two skill vectors, `[-1, 1]`.
    Cosine,
    /// Skill coverage ratio, `[0, 1]`.
    Coverage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub employee_id: EmployeeId,
    pub score: f64,
    /// `[0, 100]`
    pub coverage_pct: f64,
    pub basis: ScoreBasis,
}

/// Score one eligible employee against a project.
pub fn score_candidate(project: &Project, employee: &Employee) -> ScoredCandidate {
    let similarity = match (&project.skill_vector, &employee.skill_vector) {
        (Some(p), Some(e)) => cosine_similarity(p, e),
        _ => None,
    };

    match similarity {
        Some(sim) => ScoredCandidate {
            employee_id: employee.id,
            score: sim,
            coverage_pct: skill_coverage(&project.required_skills, &employee.skills).percentage(),
            basis: ScoreBasis::Cosine,
        },
        None => score_by_coverage(project, employee),
    }
}

/// Score on skill coverage alone, ignoring any vectors.
pub fn score_by_coverage(project: &Project, employee: &Employee) -> ScoredCandidate {
    let coverage = skill_coverage(&project.required_skills, &employee.skills);
    ScoredCandidate {
        employee_id: employee.id,
        score: coverage.ratio,
        coverage_pct: coverage.percentage(),
        basis: ScoreBasis::Coverage,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::*;
    use crate::model::{Availability, ProjectId, ProjectStatus, SkillLevel};

    fn project(vector: Option<Vec<f32>>) -> Project {
        Project {
            id: ProjectId(1),
            title: "Analytics".into(),
            description: String::new(),
            required_skills: vec![SkillLevel::new("Python", 3), SkillLevel::new("SQL", 2)],
            start_date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            status: ProjectStatus::Planning,
            manager_id: EmployeeId(50),
            team_size: 1,
            priority: 1,
            skill_vector: vector,
            created_at: Utc::now(),
        }
    }

    fn employee(vector: Option<Vec<f32>>) -> Employee {
        Employee {
            id: EmployeeId(3),
            employee_code: "E-3".into(),
            name: "Robin".into(),
            department: "Data".into(),
            position: "Analyst".into(),
            skills: vec![SkillLevel::new("Python", 4)],
            experience_years: 4.0,
            availability: Availability {
                start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end: None,
            },
            current_project: None,
            skill_vector: vector,
        }
    }

    #[test]
    fn falls_back_to_coverage_without_vectors() {
        let scored = score_candidate(&project(None), &employee(None));

        assert_eq!(scored.score, 0.5);
        assert_eq!(scored.coverage_pct, 50.0);
        assert_eq!(scored.basis, ScoreBasis::Coverage);
    }

    #[test]
    fn one_missing_vector_is_enough_to_fall_back() {
        let scored = score_candidate(&project(Some(vec![1.0, 0.0])), &employee(None));
        assert_eq!(scored.score, 0.5);
        assert_eq!(scored.basis, ScoreBasis::Coverage);

        let scored = score_candidate(&project(None), &employee(Some(vec![1.0, 0.0])));
        assert_eq!(scored.score, 0.5);
    }

    #[test]
    fn uses_cosine_when_both_vectors_exist() {
        let scored = score_candidate(
            &project(Some(vec![1.0, 0.0])),
            &employee(Some(vec![-1.0, 0.0])),
        );

        assert!((scored.score + 1.0).abs() < 1e-12);
        assert_eq!(scored.coverage_pct, 50.0);
        assert_eq!(scored.basis, ScoreBasis::Cosine);
    }

    #[test]
    fn mismatched_dimensions_fall_back_to_coverage() {
        let scored = score_candidate(
            &project(Some(vec![1.0, 0.0, 0.0])),
            &employee(Some(vec![1.0, 0.0])),
        );
        assert_eq!(scored.score, 0.5);
        assert_eq!(scored.basis, ScoreBasis::Coverage);
    }
}
