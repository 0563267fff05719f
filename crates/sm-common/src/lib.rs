//! Skill-based project staffing core.
//!
//! Employees are filtered by availability, scored against a project's skill
//! requirements (cosine similarity of skill vectors, or skill coverage when a
//! vector is missing) and persisted as ranked matches that move through a
//! human approval lifecycle.

pub mod db;
pub mod embedding;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod matching;
pub mod model;
pub mod run_id;
pub mod service;
pub mod validation;

pub use error::MatchingError;
pub use lifecycle::{InvalidTransition, MatchAction};
pub use model::{
    Availability, Employee, EmployeeId, Feedback, FeedbackId, Match, MatchId, MatchStatus,
    NewEmployee, NewFeedback, NewProject, Project, ProjectId, ProjectStatus, SkillLevel,
};
pub use service::{
    MatchListing, MatchingService, ProjectWithMatches, RecomputeOutcome, TransitionOutcome,
};
pub use validation::ValidationError;
