use std::collections::HashMap;

use crate::model::SkillLevel;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkillCoverage {
    /// Required skills met at or above the minimum level.
    pub matched: usize,
    pub required: usize,
    /// `matched / required`, or `0.0` when nothing is required.
    pub ratio: f64,
}

impl SkillCoverage {
    pub fn percentage(&self) -> f64 {
        self.ratio * 100.0
    }
}

fn level_map(skills: &[SkillLevel]) -> HashMap<String, u8> {
    skills.iter().map(|s| (s.key(), s.level)).collect()
}

/// Fraction of the project's required skills the employee holds at or above
/// the required minimum proficiency.
pub fn skill_coverage(required: &[SkillLevel], possessed: &[SkillLevel]) -> SkillCoverage {
    let required_map = level_map(required);
    if required_map.is_empty() {
        return SkillCoverage {
            matched: 0,
            required: 0,
            ratio: 0.0,
        };
    }

    let possessed_map = level_map(possessed);
    let matched = required_map
        .iter()
        .filter(|(skill, min_level)| {
            possessed_map
                .get(skill.as_str())
                .is_some_and(|level| *level >= **min_level)
        })
        .count();

    SkillCoverage {
        matched,
        required: required_map.len(),
        ratio: matched as f64 / required_map.len() as f64,
    }
}
