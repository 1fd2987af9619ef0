//! The tally and report engine. Everything here is a pure function over
//! rows already fetched from the database, so the arithmetic can be tested
//! without storage.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    db::{
        ballot::{Ballot, Measure},
        vote::{Vote, VoteType, VoteValue},
    },
    mongodb::Id,
};

/// One entry of a measure's value histogram.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub value: VoteValue,
    pub count: u64,
}

/// A measure's tallied votes, electronic and paper combined.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureResult {
    pub measure_id: Id,
    pub text: String,
    pub votes: Vec<VoteTally>,
}

/// The results endpoint response.
#[derive(Debug, Serialize, Deserialize)]
pub struct BallotResults {
    pub ballot_id: Id,
    pub results: Vec<MeasureResult>,
}

/// Whether a measure met the acceptance threshold.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureAcceptance {
    pub measure_id: Id,
    pub accepted: bool,
}

/// The full admin report for a ballot.
#[derive(Debug, Serialize, Deserialize)]
pub struct BallotReport {
    pub ballot_id: Id,
    pub title: String,
    pub quorum: u32,
    pub acceptance_threshold: u32,
    pub total_voters: u64,
    pub quorum_met: bool,
    pub results: Vec<MeasureResult>,
    pub acceptance: Vec<MeasureAcceptance>,
}

/// One distinct voter in the audit trail. No vote values: turnout can be
/// verified without breaking ballot secrecy.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuditEntry {
    pub member_id: Id,
    pub username: String,
    pub cast_at: DateTime<Utc>,
}

/// The audit endpoint response.
#[derive(Debug, Serialize, Deserialize)]
pub struct BallotAudit {
    pub ballot_id: Id,
    pub voters: Vec<AuditEntry>,
}

/// Tally votes per measure into a value histogram. Electronic rows each
/// contribute their count of 1; paper rows contribute their stored lump sum.
pub fn tally_results(measures: &[Measure], votes: &[Vote]) -> Vec<MeasureResult> {
    measures
        .iter()
        .map(|measure| {
            let mut counts: BTreeMap<VoteValue, u64> = BTreeMap::new();
            for vote in votes.iter().filter(|vote| vote.measure_id == measure.id) {
                *counts.entry(vote.vote_value).or_default() += u64::from(vote.vote_count);
            }
            MeasureResult {
                measure_id: measure.id,
                text: measure.text.clone(),
                votes: counts
                    .into_iter()
                    .map(|(value, count)| VoteTally { value, count })
                    .collect(),
            }
        })
        .collect()
}

/// Distinct electronic voters plus the sum of all paper counts. The two
/// pools are assumed disjoint and are never reconciled against each other.
pub fn total_voters(votes: &[Vote]) -> u64 {
    let electronic: HashSet<Id> = votes
        .iter()
        .filter(|vote| vote.vote_type == VoteType::Electronic)
        .filter_map(|vote| vote.member_id)
        .collect();
    let paper: u64 = votes
        .iter()
        .filter(|vote| vote.vote_type == VoteType::Paper)
        .map(|vote| u64::from(vote.vote_count))
        .sum();
    electronic.len() as u64 + paper
}

/// A measure is accepted iff its yes share meets the threshold. Exact ties
/// pass. A measure with no votes at all is never accepted.
pub fn acceptance(results: &[MeasureResult], threshold: u32) -> Vec<MeasureAcceptance> {
    results
        .iter()
        .map(|result| {
            let total: u64 = result.votes.iter().map(|tally| tally.count).sum();
            // Integer comparison: count / total * 100 >= threshold.
            let accepted = total > 0
                && result.votes.iter().any(|tally| {
                    tally.value == VoteValue::Yes
                        && tally.count * 100 >= u64::from(threshold) * total
                });
            MeasureAcceptance {
                measure_id: result.measure_id,
                accepted,
            }
        })
        .collect()
}

/// Assemble the full report for a ballot.
pub fn report(ballot: &Ballot, measures: &[Measure], votes: &[Vote]) -> BallotReport {
    let results = tally_results(measures, votes);
    let total_voters = total_voters(votes);
    let acceptance = acceptance(&results, ballot.acceptance_threshold);
    BallotReport {
        ballot_id: ballot.id,
        title: ballot.title.clone(),
        quorum: ballot.quorum,
        acceptance_threshold: ballot.acceptance_threshold,
        total_voters,
        quorum_met: total_voters >= u64::from(ballot.quorum),
        results,
        acceptance,
    }
}

/// Distinct electronic voters with their earliest cast time, ordered by it.
/// Usernames are joined in by the caller.
pub fn turnout(votes: &[Vote]) -> Vec<(Id, DateTime<Utc>)> {
    let mut earliest: HashMap<Id, DateTime<Utc>> = HashMap::new();
    for vote in votes
        .iter()
        .filter(|vote| vote.vote_type == VoteType::Electronic)
    {
        if let Some(member_id) = vote.member_id {
            let entry = earliest.entry(member_id).or_insert(vote.cast_at);
            if vote.cast_at < *entry {
                *entry = vote.cast_at;
            }
        }
    }
    let mut turnout: Vec<_> = earliest.into_iter().collect();
    turnout.sort_by_key(|(_, cast_at)| *cast_at);
    turnout
}
