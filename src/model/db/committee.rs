use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// Core committee data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteeCore {
    pub name: String,
    pub description: String,
}

/// A committee without an ID.
pub type NewCommittee = CommitteeCore;

/// A committee from the database, with its unique ID.
#[derive(Debug, Serialize, Deserialize)]
pub struct Committee {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub committee: CommitteeCore,
}

impl Deref for Committee {
    type Target = CommitteeCore;

    fn deref(&self) -> &Self::Target {
        &self.committee
    }
}

impl DerefMut for Committee {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.committee
    }
}

/// A committee roster entry. Unique per (committee, member) pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CommitteeMembership {
    pub committee_id: Id,
    pub member_id: Id,
}

/// A ballot visibility assignment. Unique per (ballot, committee) pair.
/// A ballot with no assignments at all is open to every member.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BallotCommittee {
    pub ballot_id: Id,
    pub committee_id: Id,
}
