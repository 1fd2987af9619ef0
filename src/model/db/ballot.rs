use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// Core ballot data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotCore {
    pub title: String,
    pub description: String,
    /// Instant from which votes are accepted (inclusive).
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub start_time: DateTime<Utc>,
    /// Instant from which votes are rejected (exclusive).
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub end_time: DateTime<Utc>,
    /// Minimum number of voters for the ballot to be binding.
    pub quorum: u32,
    /// Percentage of yes votes a measure needs to pass, 0-100.
    pub acceptance_threshold: u32,
    pub created_by: Id,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

/// Where an instant falls relative to a ballot's voting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VotingWindow {
    NotYetOpen,
    Open,
    Closed,
}

impl BallotCore {
    /// Classify `now` against the voting window: `start_time <= now < end_time`
    /// is open, earlier is not yet open, later (or at the end instant) is closed.
    pub fn voting_window(&self, now: DateTime<Utc>) -> VotingWindow {
        if now < self.start_time {
            VotingWindow::NotYetOpen
        } else if now < self.end_time {
            VotingWindow::Open
        } else {
            VotingWindow::Closed
        }
    }
}

/// A ballot without an ID.
pub type NewBallot = BallotCore;

/// A ballot from the database, with its unique ID.
#[derive(Debug, Serialize, Deserialize)]
pub struct Ballot {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub ballot: BallotCore,
}

impl Deref for Ballot {
    type Target = BallotCore;

    fn deref(&self) -> &Self::Target {
        &self.ballot
    }
}

impl DerefMut for Ballot {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.ballot
    }
}

/// Core measure data. Each measure belongs to exactly one ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureCore {
    pub ballot_id: Id,
    pub text: String,
    pub description: String,
}

/// A measure without an ID.
pub type NewMeasure = MeasureCore;

/// A measure from the database, with its unique ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measure {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub measure: MeasureCore,
}

impl Deref for Measure {
    type Target = MeasureCore;

    fn deref(&self) -> &Self::Target {
        &self.measure
    }
}


/// Example data for tests.
#[cfg(test)]
mod examples {
    use chrono::Duration;

    use super::*;

    impl BallotCore {
        /// A ballot whose window opened an hour before `now` and closes an
        /// hour after it.
        pub fn example_at(now: DateTime<Utc>, created_by: Id) -> Self {
            Self {
                title: "Annual General Meeting".to_string(),
                description: "AGM motions".to_string(),
                start_time: now - Duration::hours(1),
                end_time: now + Duration::hours(1),
                quorum: 5,
                acceptance_threshold: 50,
                created_by,
                created_at: now,
            }
        }

        /// A ballot that is currently open for voting.
        pub fn current_example(created_by: Id) -> Self {
            Self::example_at(Utc::now(), created_by)
        }

        /// A ballot whose window has not opened yet.
        pub fn future_example(created_by: Id) -> Self {
            let now = Utc::now();
            Self {
                title: "Next Year's Budget".to_string(),
                start_time: now + Duration::days(30),
                end_time: now + Duration::days(31),
                ..Self::example_at(now, created_by)
            }
        }

        /// A ballot whose window has already closed.
        pub fn past_example(created_by: Id) -> Self {
            let now = Utc::now();
            Self {
                title: "Last Year's Budget".to_string(),
                start_time: now - Duration::days(31),
                end_time: now - Duration::days(30),
                ..Self::example_at(now, created_by)
            }
        }
    }

    impl MeasureCore {
        pub fn example(ballot_id: Id) -> Self {
            Self {
                ballot_id,
                text: "Approve the budget".to_string(),
                description: "As circulated before the meeting".to_string(),
            }
        }

        pub fn example2(ballot_id: Id) -> Self {
            Self {
                ballot_id,
                text: "Elect the returning officer".to_string(),
                description: String::new(),
            }
        }
    }
}
