use serde::{Deserialize, Serialize};

use crate::model::{db::vote::VoteValue, mongodb::Id};

/// The body of a cast-vote request: one value per measure the member is
/// voting on.
#[derive(Debug, Serialize, Deserialize)]
pub struct BallotVotes {
    pub votes: Vec<VoteSpec>,
}

/// A single vote within a cast-vote request.
#[derive(Debug, Serialize, Deserialize)]
pub struct VoteSpec {
    pub measure_id: Id,
    pub vote_value: VoteValue,
}

/// Administrator-entered paper totals for a single measure. Absent counts
/// default to zero, but at least one must be present.
#[derive(Debug, Serialize, Deserialize)]
pub struct PaperVotes {
    pub measure_id: Option<Id>,
    pub yes: Option<u32>,
    pub no: Option<u32>,
    pub abstain: Option<u32>,
}
