use serde::{Deserialize, Serialize};

use crate::model::{db::committee::Committee, mongodb::Id};

/// A committee create/rename request.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommitteeSpec {
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
}

/// A member on a committee roster.
#[derive(Debug, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: Id,
    pub username: String,
}

/// A committee with its full roster, as returned by the list endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommitteeView {
    pub id: Id,
    pub name: String,
    pub description: String,
    pub members: Vec<RosterEntry>,
}

impl CommitteeView {
    pub fn new(committee: Committee, members: Vec<RosterEntry>) -> Self {
        Self {
            id: committee.id,
            name: committee.committee.name,
            description: committee.committee.description,
            members,
        }
    }
}

/// Request to add a member to a committee roster.
#[derive(Debug, Serialize, Deserialize)]
pub struct RosterAddRequest {
    pub member_id: Option<Id>,
}

/// Request to restrict a ballot to a committee.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommitteeAssignRequest {
    pub committee_id: Option<Id>,
}
