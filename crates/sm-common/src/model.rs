use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::matching::ScoreBasis;

/// Lowest proficiency / minimum-proficiency level accepted on a skill entry.
pub const MIN_LEVEL: u8 = 1;
/// Highest proficiency / minimum-proficiency level accepted on a skill entry.
pub const MAX_LEVEL: u8 = 5;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

entity_id!(EmployeeId);
entity_id!(ProjectId);
entity_id!(
    /// Identity of a persisted match row. Unique per `(project, employee)` pair.
    MatchId
);
entity_id!(FeedbackId);

/// One `{skill, level}` entry.
///
/// On an employee `level` is the proficiency; on a project it is the minimum
/// proficiency required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillLevel {
    pub skill: String,
    pub level: u8,
}

impl SkillLevel {
    pub fn new(skill: impl Into<String>, level: u8) -> Self {
        Self {
            skill: skill.into(),
            level,
        }
    }

    /// Key used when comparing skills across employees and projects.
    pub fn key(&self) -> String {
        normalize_skill_key(&self.skill)
    }
}

pub fn normalize_skill_key(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// Availability window. `end == None` means available indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub employee_code: String,
    pub name: String,
    pub department: String,
    pub position: String,
    pub skills: Vec<SkillLevel>,
    pub experience_years: f32,
    pub availability: Availability,
    /// Only written by the lifecycle accept/complete transitions.
    pub current_project: Option<ProjectId>,
    #[serde(default, skip_serializing)]
    pub skill_vector: Option<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    Planning,
    InProgress,
    Completed,
    OnHold,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Planning => "PLANNING",
            ProjectStatus::InProgress => "IN_PROGRESS",
            ProjectStatus::Completed => "COMPLETED",
            ProjectStatus::OnHold => "ON_HOLD",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PLANNING" => Some(ProjectStatus::Planning),
            "IN_PROGRESS" => Some(ProjectStatus::InProgress),
            "COMPLETED" => Some(ProjectStatus::Completed),
            "ON_HOLD" => Some(ProjectStatus::OnHold),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub title: String,
    pub description: String,
    pub required_skills: Vec<SkillLevel>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: ProjectStatus,
    pub manager_id: EmployeeId,
    pub team_size: u32,
    pub priority: u8,
    #[serde(default, skip_serializing)]
    pub skill_vector: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Suggested,
    Accepted,
    Rejected,
    Completed,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Suggested => "SUGGESTED",
            MatchStatus::Accepted => "ACCEPTED",
            MatchStatus::Rejected => "REJECTED",
            MatchStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "SUGGESTED" => Some(MatchStatus::Suggested),
            "ACCEPTED" => Some(MatchStatus::Accepted),
            "REJECTED" => Some(MatchStatus::Rejected),
            "COMPLETED" => Some(MatchStatus::Completed),
            _ => None,
        }
    }

    /// A human decision has been recorded on the match.
    pub fn is_finalized(&self) -> bool {
        !matches!(self, MatchStatus::Suggested)
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub project_id: ProjectId,
    pub employee_id: EmployeeId,
    /// Cosine similarity in `[-1, 1]`, or coverage ratio in `[0, 1]` when a vector is missing.
    pub match_score: f64,
    /// `[0, 100]`
    pub skills_match_percentage: f64,
    /// Representation `match_score` was computed in on its last write.
    pub score_basis: ScoreBasis,
    pub availability_match: bool,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub id: FeedbackId,
    pub match_id: MatchId,
    pub rating: u8,
    pub text: String,
    pub author_id: EmployeeId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEmployee {
    pub employee_code: String,
    pub name: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub skills: Vec<SkillLevel>,
    #[serde(default)]
    pub experience_years: f32,
    pub availability: Availability,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProject {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub required_skills: Vec<SkillLevel>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default = "default_project_status")]
    pub status: ProjectStatus,
    pub team_size: u32,
    pub priority: u8,
    pub manager_id: EmployeeId,
}

fn default_project_status() -> ProjectStatus {
    ProjectStatus::Planning
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFeedback {
    pub match_id: MatchId,
    pub rating: u8,
    pub text: String,
    pub author_id: EmployeeId,
}
