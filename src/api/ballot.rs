use std::collections::{HashMap, HashSet};

use chrono::Utc;
use mongodb::{bson::doc, options::FindOptions, Client};
use rocket::{futures::TryStreamExt, serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            ballot::{
                reconcile_measures, BallotDetail, BallotSpec, BallotSummary, BallotView,
                CreatedBallot, MeasureInput, MeasureSpec,
            },
            committee::CommitteeAssignRequest,
        },
        auth::{Admin, AuthToken},
        db::{
            ballot::{Ballot, Measure, MeasureCore, NewBallot, NewMeasure},
            committee::{BallotCommittee, Committee, CommitteeMembership},
            member::Member,
            vote::Vote,
        },
        mongodb::{is_duplicate_key_error, Coll, Id},
    },
};

pub fn routes() -> Vec<Route> {
    routes![
        create_ballot,
        list_ballots,
        get_ballot,
        update_ballot,
        delete_ballot,
        assign_committee,
        unassign_committee,
    ]
}

#[post("/ballots", data = "<spec>", format = "json")]
pub async fn create_ballot(
    token: AuthToken<Admin>,
    spec: Json<BallotSpec>,
    new_ballots: Coll<NewBallot>,
    measures: Coll<Measure>,
    new_measures: Coll<NewMeasure>,
    db_client: &State<Client>,
) -> Result<Json<CreatedBallot>> {
    let spec = spec.0;
    let (title, start_time, end_time) = match (spec.title, spec.start_time, spec.end_time) {
        (Some(title), Some(start), Some(end)) if !title.is_empty() => (title, start, end),
        _ => {
            return Err(Error::BadRequest(
                "Missing required fields or measures".to_string(),
            ));
        }
    };
    let inputs: Vec<MeasureInput> = spec
        .measures
        .unwrap_or_default()
        .into_iter()
        .map(MeasureSpec::normalize)
        .collect();
    if inputs.is_empty() {
        return Err(Error::BadRequest(
            "Missing required fields or measures".to_string(),
        ));
    }

    let ballot = NewBallot {
        title,
        description: spec.description.unwrap_or_default(),
        start_time,
        end_time,
        quorum: spec.quorum.unwrap_or(0),
        acceptance_threshold: spec.acceptance_threshold.unwrap_or(50),
        created_by: token.id(),
        created_at: Utc::now(),
    };

    // Insert the ballot and its measures atomically.
    let ballot_id = {
        let mut session = db_client.start_session(None).await?;
        session.start_transaction(None).await?;

        let ballot_id: Id = new_ballots
            .insert_one_with_session(&ballot, None, &mut session)
            .await?
            .inserted_id
            .as_object_id()
            .unwrap() // Valid because the ID comes directly from the DB.
            .into();

        let rows: Vec<NewMeasure> = inputs
            .into_iter()
            .map(|input| MeasureCore {
                ballot_id,
                text: input.text,
                description: input.description,
            })
            .collect();
        new_measures
            .insert_many_with_session(&rows, None, &mut session)
            .await?;

        session.commit_transaction().await?;
        ballot_id
    };

    let inserted: Vec<Measure> = measures
        .find(doc! {"ballot_id": ballot_id}, None)
        .await?
        .try_collect()
        .await?;
    Ok(Json(CreatedBallot {
        ballot_id,
        measures: inserted.into_iter().map(Into::into).collect(),
    }))
}

#[get("/ballots")]
pub async fn list_ballots(
    token: AuthToken<Member>,
    ballots: Coll<Ballot>,
    assignments: Coll<BallotCommittee>,
    committees: Coll<Committee>,
    memberships: Coll<CommitteeMembership>,
    votes: Coll<Vote>,
) -> Result<Json<Vec<BallotSummary>>> {
    let oldest_first = FindOptions::builder().sort(doc! {"_id": 1}).build();
    let ballot_list: Vec<Ballot> = ballots
        .find(None, oldest_first)
        .await?
        .try_collect()
        .await?;

    // Committee assignments and names for annotation.
    let assignment_list: Vec<BallotCommittee> =
        assignments.find(None, None).await?.try_collect().await?;
    let committee_list: Vec<Committee> = committees.find(None, None).await?.try_collect().await?;
    let committee_names: HashMap<Id, String> = committee_list
        .into_iter()
        .map(|committee| (committee.id, committee.committee.name))
        .collect();
    let mut assigned: HashMap<Id, Vec<Id>> = HashMap::new();
    for assignment in assignment_list {
        assigned
            .entry(assignment.ballot_id)
            .or_default()
            .push(assignment.committee_id);
    }

    // The caller's committees and the ballots they have voted on.
    let with_member = doc! {
        "member_id": token.id(),
    };
    let my_committees: HashSet<Id> = memberships
        .find(with_member.clone(), None)
        .await?
        .try_collect::<Vec<CommitteeMembership>>()
        .await?
        .into_iter()
        .map(|membership| membership.committee_id)
        .collect();
    let voted: HashSet<Id> = votes
        .find(with_member, None)
        .await?
        .try_collect::<Vec<Vote>>()
        .await?
        .into_iter()
        .map(|vote| vote.ballot_id)
        .collect();

    let is_admin = token.is_admin();
    let summaries = ballot_list
        .into_iter()
        .map(|ballot| {
            let committee_ids = assigned.remove(&ballot.id).unwrap_or_default();
            // Open to all when unassigned, else members of any assigned committee.
            let is_visible = committee_ids.is_empty()
                || committee_ids.iter().any(|id| my_committees.contains(id));
            let has_voted = voted.contains(&ballot.id);
            BallotSummary {
                committee_names: committee_ids
                    .iter()
                    .filter_map(|id| committee_names.get(id).cloned())
                    .collect(),
                committee_ids,
                is_visible,
                has_voted,
                ballot: ballot.into(),
            }
        })
        // Admins see everything, annotated; members only what is visible.
        .filter(|summary| is_admin || summary.is_visible)
        .collect();

    Ok(Json(summaries))
}

#[get("/ballots/<ballot_id>")]
pub async fn get_ballot(
    token: AuthToken<Member>,
    ballot_id: Id,
    ballots: Coll<Ballot>,
    measures: Coll<Measure>,
    assignments: Coll<BallotCommittee>,
    memberships: Coll<CommitteeMembership>,
    votes: Coll<Vote>,
) -> Result<Json<BallotDetail>> {
    // The committee restriction applies to every caller, mirroring the UI
    // rule that admins outside the committee do not get access either.
    let with_ballot = doc! {
        "ballot_id": ballot_id,
    };
    let assigned: Vec<BallotCommittee> = assignments
        .find(with_ballot.clone(), None)
        .await?
        .try_collect()
        .await?;
    if !assigned.is_empty() {
        let mine: HashSet<Id> = memberships
            .find(doc! {"member_id": token.id()}, None)
            .await?
            .try_collect::<Vec<CommitteeMembership>>()
            .await?
            .into_iter()
            .map(|membership| membership.committee_id)
            .collect();
        if !assigned
            .iter()
            .any(|assignment| mine.contains(&assignment.committee_id))
        {
            return Err(Error::Forbidden(
                "Not authorized for this ballot".to_string(),
            ));
        }
    }

    let ballot = ballots
        .find_one(ballot_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Ballot {}", ballot_id)))?;
    let measure_list: Vec<Measure> = measures
        .find(with_ballot.clone(), None)
        .await?
        .try_collect()
        .await?;

    let has_voted = votes
        .find_one(
            doc! {"ballot_id": ballot_id, "member_id": token.id()},
            None,
        )
        .await?
        .is_some();

    Ok(Json(BallotDetail {
        ballot: ballot.into(),
        measures: measure_list.into_iter().map(Into::into).collect(),
        has_voted,
    }))
}

#[put("/ballots/<ballot_id>", data = "<spec>", format = "json")]
pub async fn update_ballot(
    _token: AuthToken<Admin>,
    ballot_id: Id,
    spec: Json<BallotSpec>,
    ballots: Coll<Ballot>,
    new_ballots: Coll<NewBallot>,
    measures: Coll<Measure>,
    new_measures: Coll<NewMeasure>,
    db_client: &State<Client>,
) -> Result<Json<BallotView>> {
    let spec = spec.0;
    let ballot = ballots
        .find_one(ballot_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Ballot {}", ballot_id)))?;

    // Fields absent from the request keep their current values.
    let updated = NewBallot {
        title: spec.title.unwrap_or_else(|| ballot.title.clone()),
        description: spec
            .description
            .unwrap_or_else(|| ballot.description.clone()),
        start_time: spec.start_time.unwrap_or(ballot.start_time),
        end_time: spec.end_time.unwrap_or(ballot.end_time),
        quorum: spec.quorum.unwrap_or(ballot.quorum),
        acceptance_threshold: spec.acceptance_threshold.unwrap_or(ballot.acceptance_threshold),
        created_by: ballot.created_by,
        created_at: ballot.created_at,
    };

    // Reconcile measures: update by ID, insert the ID-less, delete the absent.
    let diff = match spec.measures {
        Some(specs) => {
            let incoming: Vec<MeasureInput> =
                specs.into_iter().map(MeasureSpec::normalize).collect();
            let existing: Vec<Measure> = measures
                .find(doc! {"ballot_id": ballot_id}, None)
                .await?
                .try_collect()
                .await?;
            Some(reconcile_measures(&existing, incoming))
        }
        None => None,
    };

    // Apply everything atomically so readers never observe a half-synced
    // measure list.
    {
        let mut session = db_client.start_session(None).await?;
        session.start_transaction(None).await?;

        let result = new_ballots
            .replace_one_with_session(ballot_id.as_doc(), &updated, None, &mut session)
            .await?;
        assert_eq!(result.matched_count, 1);

        if let Some(diff) = diff {
            for (measure_id, input) in diff.update {
                let update = doc! {
                    "$set": {
                        "text": input.text,
                        "description": input.description,
                    }
                };
                measures
                    .update_one_with_session(measure_id.as_doc(), update, None, &mut session)
                    .await?;
            }
            if !diff.insert.is_empty() {
                let rows: Vec<NewMeasure> = diff
                    .insert
                    .into_iter()
                    .map(|input| MeasureCore {
                        ballot_id,
                        text: input.text,
                        description: input.description,
                    })
                    .collect();
                new_measures
                    .insert_many_with_session(&rows, None, &mut session)
                    .await?;
            }
            if !diff.delete.is_empty() {
                let filter = doc! {
                    "_id": { "$in": diff.delete },
                };
                measures
                    .delete_many_with_session(filter, None, &mut session)
                    .await?;
            }
        }

        session.commit_transaction().await?;
    }

    let ballot = ballots.find_one(ballot_id.as_doc(), None).await?.unwrap();
    Ok(Json(ballot.into()))
}

#[delete("/ballots/<ballot_id>")]
pub async fn delete_ballot(
    _token: AuthToken<Admin>,
    ballot_id: Id,
    ballots: Coll<Ballot>,
    measures: Coll<Measure>,
    votes: Coll<Vote>,
    assignments: Coll<BallotCommittee>,
    db_client: &State<Client>,
) -> Result<()> {
    ballots
        .find_one(ballot_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Ballot {}", ballot_id)))?;

    // Cascade: votes, then measures, then the ballot, then its assignments.
    {
        let mut session = db_client.start_session(None).await?;
        session.start_transaction(None).await?;

        let with_ballot = doc! {
            "ballot_id": ballot_id,
        };
        votes
            .delete_many_with_session(with_ballot.clone(), None, &mut session)
            .await?;
        measures
            .delete_many_with_session(with_ballot.clone(), None, &mut session)
            .await?;
        let result = ballots
            .delete_one_with_session(ballot_id.as_doc(), None, &mut session)
            .await?;
        assert_eq!(result.deleted_count, 1);
        assignments
            .delete_many_with_session(with_ballot, None, &mut session)
            .await?;

        session.commit_transaction().await?;
    }

    Ok(())
}

#[post("/ballots/<ballot_id>/committees", data = "<request>", format = "json")]
pub async fn assign_committee(
    _token: AuthToken<Admin>,
    ballot_id: Id,
    request: Json<CommitteeAssignRequest>,
    ballots: Coll<Ballot>,
    committees: Coll<Committee>,
    assignments: Coll<BallotCommittee>,
) -> Result<()> {
    let committee_id = match request.0.committee_id {
        Some(committee_id) => committee_id,
        None => return Err(Error::BadRequest("Committee ID required".to_string())),
    };

    ballots
        .find_one(ballot_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Ballot {}", ballot_id)))?;
    committees
        .find_one(committee_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Committee {}", committee_id)))?;

    let assignment = BallotCommittee {
        ballot_id,
        committee_id,
    };
    match assignments.insert_one(assignment, None).await {
        Ok(_) => Ok(()),
        // Re-assigning is a no-op.
        Err(e) if is_duplicate_key_error(&e) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[delete("/ballots/<ballot_id>/committees/<committee_id>")]
pub async fn unassign_committee(
    _token: AuthToken<Admin>,
    ballot_id: Id,
    committee_id: Id,
    assignments: Coll<BallotCommittee>,
) -> Result<()> {
    let filter = doc! {
        "ballot_id": ballot_id,
        "committee_id": committee_id,
    };
    assignments.delete_one(filter, None).await?;
    Ok(())
}
