use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    db::ballot::{Ballot, Measure},
    mongodb::Id,
};

/// A ballot create/update request. Required fields are options so that the
/// handler can reject missing ones with a 400 rather than a parse failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct BallotSpec {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub quorum: Option<u32>,
    pub acceptance_threshold: Option<u32>,
    pub measures: Option<Vec<MeasureSpec>>,
}

/// A measure in a ballot request: either the two-field form (with an ID when
/// updating an existing measure), or the legacy single string with text and
/// description joined by `||`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeasureSpec {
    Full {
        id: Option<Id>,
        text: String,
        #[serde(default)]
        description: String,
    },
    Legacy(String),
}

impl MeasureSpec {
    /// Normalize to the two-field form, splitting the legacy delimiter.
    pub fn normalize(self) -> MeasureInput {
        match self {
            Self::Full {
                id,
                text,
                description,
            } => MeasureInput {
                id,
                text,
                description,
            },
            Self::Legacy(raw) => match raw.split_once("||") {
                Some((text, description)) => MeasureInput {
                    id: None,
                    text: text.to_string(),
                    description: description.to_string(),
                },
                None => MeasureInput {
                    id: None,
                    text: raw,
                    description: String::new(),
                },
            },
        }
    }
}

/// A measure normalized at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasureInput {
    pub id: Option<Id>,
    pub text: String,
    pub description: String,
}

/// The plan for synchronising a ballot's stored measures with an incoming
/// list: measures carrying an ID are updated in place, measures without one
/// are inserted, and stored measures absent from the list are deleted.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct MeasureDiff {
    pub update: Vec<(Id, MeasureInput)>,
    pub insert: Vec<MeasureInput>,
    pub delete: Vec<Id>,
}

/// Three-way diff of the stored measures against the incoming list.
/// Pure so it can be tested without a database.
pub fn reconcile_measures(existing: &[Measure], incoming: Vec<MeasureInput>) -> MeasureDiff {
    let mut diff = MeasureDiff::default();
    for measure in incoming {
        match measure.id {
            Some(id) => diff.update.push((id, measure)),
            None => diff.insert.push(measure),
        }
    }
    let kept: HashSet<Id> = diff.update.iter().map(|(id, _)| *id).collect();
    diff.delete = existing
        .iter()
        .map(|measure| measure.id)
        .filter(|id| !kept.contains(id))
        .collect();
    diff
}

/// A measure as presented over the API.
#[derive(Debug, Serialize, Deserialize)]
pub struct MeasureView {
    pub id: Id,
    pub text: String,
    pub description: String,
}

impl From<Measure> for MeasureView {
    fn from(measure: Measure) -> Self {
        Self {
            id: measure.id,
            text: measure.measure.text,
            description: measure.measure.description,
        }
    }
}

/// A ballot's own fields as presented over the API.
#[derive(Debug, Serialize, Deserialize)]
pub struct BallotView {
    pub id: Id,
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub quorum: u32,
    pub acceptance_threshold: u32,
    pub created_by: Id,
    pub created_at: DateTime<Utc>,
}

impl From<Ballot> for BallotView {
    fn from(ballot: Ballot) -> Self {
        Self {
            id: ballot.id,
            title: ballot.ballot.title,
            description: ballot.ballot.description,
            start_time: ballot.ballot.start_time,
            end_time: ballot.ballot.end_time,
            quorum: ballot.ballot.quorum,
            acceptance_threshold: ballot.ballot.acceptance_threshold,
            created_by: ballot.ballot.created_by,
            created_at: ballot.ballot.created_at,
        }
    }
}

/// A ballot in the list endpoint, annotated with its committee assignments
/// and the caller's relationship to it.
#[derive(Debug, Serialize, Deserialize)]
pub struct BallotSummary {
    #[serde(flatten)]
    pub ballot: BallotView,
    pub committee_ids: Vec<Id>,
    pub committee_names: Vec<String>,
    pub is_visible: bool,
    pub has_voted: bool,
}

/// A single ballot with its measures and the caller's voting status.
#[derive(Debug, Serialize, Deserialize)]
pub struct BallotDetail {
    #[serde(flatten)]
    pub ballot: BallotView,
    pub measures: Vec<MeasureView>,
    pub has_voted: bool,
}

/// Response to ballot creation.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedBallot {
    pub ballot_id: Id,
    pub measures: Vec<MeasureView>,
}
