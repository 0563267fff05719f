pub mod pipeline;
pub mod prefilter;
pub mod scoring;
pub mod similarity;
pub mod skills;

pub use pipeline::{MatchingPass, rank_candidates, rank_matches, rank_order, run_matching_pass};
pub use prefilter::{eligible_employees, is_available};
pub use scoring::{ScoreBasis, ScoredCandidate, score_by_coverage, score_candidate};
pub use similarity::cosine_similarity;
pub use skills::{SkillCoverage, skill_coverage};
