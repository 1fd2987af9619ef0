use std::ops::Deref;

use chrono::{DateTime, Utc};
use mongodb::bson::{serde_helpers::chrono_datetime_as_bson_datetime, to_bson, Bson};
use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// The value of a single vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteValue {
    Yes,
    No,
    Abstain,
}

impl From<VoteValue> for Bson {
    fn from(value: VoteValue) -> Self {
        to_bson(&value).expect("Serialisation is infallible")
    }
}

/// How a vote entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    /// Cast by a member through the API; always `count = 1` and carries the
    /// member's ID. At most one per (ballot, measure, member), enforced by a
    /// unique index.
    Electronic,
    /// An administrator-entered lump sum from a paper count; no member
    /// identity, at most one row per value per measure.
    Paper,
}

impl From<VoteType> for Bson {
    fn from(vote_type: VoteType) -> Self {
        to_bson(&vote_type).expect("Serialisation is infallible")
    }
}

/// Core vote data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCore {
    pub ballot_id: Id,
    pub measure_id: Id,
    pub member_id: Option<Id>,
    pub vote_value: VoteValue,
    pub vote_count: u32,
    pub vote_type: VoteType,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub cast_at: DateTime<Utc>,
}

impl VoteCore {
    /// A member's electronic vote on a single measure.
    pub fn electronic(ballot_id: Id, measure_id: Id, member_id: Id, value: VoteValue) -> Self {
        Self {
            ballot_id,
            measure_id,
            member_id: Some(member_id),
            vote_value: value,
            vote_count: 1,
            vote_type: VoteType::Electronic,
            cast_at: Utc::now(),
        }
    }

    /// An administrator-entered paper lump sum for a single value.
    pub fn paper(ballot_id: Id, measure_id: Id, value: VoteValue, count: u32) -> Self {
        Self {
            ballot_id,
            measure_id,
            member_id: None,
            vote_value: value,
            vote_count: count,
            vote_type: VoteType::Paper,
            cast_at: Utc::now(),
        }
    }
}

/// A vote without an ID.
pub type NewVote = VoteCore;

/// A vote from the database, with its unique ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub vote: VoteCore,
}

impl Deref for Vote {
    type Target = VoteCore;

    fn deref(&self) -> &Self::Target {
        &self.vote
    }
}
