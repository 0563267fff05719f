//! Match status state machine.
//!
//! ```text
//! SUGGESTED --accept--> ACCEPTED --complete--> COMPLETED
//!     \
//!      --reject--> REJECTED
//! ```
//!
//! The table here is pure. Side effects (the employee's assignment pointer)
//! belong to the store, which applies them in the same transaction as the
//! status write.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;

use crate::model::MatchStatus;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MatchAction {
    Accept,
    Reject,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot {action} a match in status {from}")]
pub struct InvalidTransition {
    pub from: MatchStatus,
    pub action: MatchAction,
}

impl MatchStatus {
    /// Status reached by applying `action`, or `InvalidTransition` when the
    /// table has no such edge.
    pub fn apply(self, action: MatchAction) -> Result<MatchStatus, InvalidTransition> {
        match (self, action) {
            (MatchStatus::Suggested, MatchAction::Accept) => Ok(MatchStatus::Accepted),
            (MatchStatus::Suggested, MatchAction::Reject) => Ok(MatchStatus::Rejected),
            (MatchStatus::Accepted, MatchAction::Complete) => Ok(MatchStatus::Completed),
            (from, action) => Err(InvalidTransition { from, action }),
        }
    }
}
