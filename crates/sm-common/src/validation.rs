use std::collections::HashSet;

use thiserror::Error;

use crate::model::{NewEmployee, NewFeedback, NewProject, SkillLevel, MAX_LEVEL, MIN_LEVEL};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;
pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 5;

/// Input rejected at the point of submission. Nothing is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

fn require_text(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    Ok(())
}

/// Validate a `{skill, level}` list for an employee profile or a project requirement.
pub fn validate_skill_levels(
    field: &'static str,
    skills: &[SkillLevel],
) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(skills.len());

    for (idx, entry) in skills.iter().enumerate() {
        if entry.skill.trim().is_empty() {
            return Err(ValidationError::new(
                field,
                format!("entry {idx} has an empty skill name"),
            ));
        }
        if !(MIN_LEVEL..=MAX_LEVEL).contains(&entry.level) {
            return Err(ValidationError::new(
                field,
                format!(
                    "level {} for '{}' is outside {MIN_LEVEL}..={MAX_LEVEL}",
                    entry.level, entry.skill
                ),
            ));
        }
        if !seen.insert(entry.key()) {
            return Err(ValidationError::new(
                field,
                format!("skill '{}' is listed more than once", entry.skill.trim()),
            ));
        }
    }

    Ok(())
}

impl NewProject {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("title", &self.title)?;
        validate_skill_levels("required_skills", &self.required_skills)?;

        if self.end_date < self.start_date {
            return Err(ValidationError::new(
                "end_date",
                format!(
                    "end date {} is before start date {}",
                    self.end_date, self.start_date
                ),
            ));
        }
        if self.team_size < 1 {
            return Err(ValidationError::new("team_size", "must be at least 1"));
        }
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&self.priority) {
            return Err(ValidationError::new(
                "priority",
                format!("must be within {MIN_PRIORITY}..={MAX_PRIORITY}"),
            ));
        }

        Ok(())
    }
}

impl NewEmployee {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("employee_code", &self.employee_code)?;
        require_text("name", &self.name)?;
        validate_skill_levels("skills", &self.skills)?;

        if !self.experience_years.is_finite() || self.experience_years < 0.0 {
            return Err(ValidationError::new(
                "experience_years",
                "must be a non-negative number",
            ));
        }
        if let Some(end) = self.availability.end {
            if end < self.availability.start {
                return Err(ValidationError::new(
                    "availability",
                    format!(
                        "end {} is before start {}",
                        end, self.availability.start
                    ),
                ));
            }
        }

        Ok(())
    }
}

impl NewFeedback {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(MIN_RATING..=MAX_RATING).contains(&self.rating) {
            return Err(ValidationError::new(
                "rating",
                format!(
                    "{} is outside {MIN_RATING}..={MAX_RATING}",
                    self.rating
                ),
            ));
        }
        require_text("text", &self.text)
    }
}
