use std::collections::{HashMap, HashSet};

use chrono::Utc;
use mongodb::{bson::doc, Client};
use rocket::{futures::TryStreamExt, serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    model::{
        api::vote::{BallotVotes, PaperVotes},
        auth::{Admin, AuthToken},
        db::{
            ballot::{Ballot, Measure, VotingWindow},
            member::Member,
            vote::{NewVote, Vote, VoteCore, VoteType, VoteValue},
        },
        mongodb::{is_duplicate_key_error, Coll, Id},
        report::{self, AuditEntry, BallotAudit, BallotReport, BallotResults},
    },
};

pub fn routes() -> Vec<Route> {
    routes![
        cast_votes,
        record_paper_votes,
        get_results,
        get_report,
        get_audit,
    ]
}

#[post("/ballots/<ballot_id>/vote", data = "<ballot_votes>", format = "json")]
pub async fn cast_votes(
    token: AuthToken<Member>,
    ballot_id: Id,
    ballot_votes: Json<BallotVotes>,
    ballots: Coll<Ballot>,
    measures: Coll<Measure>,
    votes: Coll<Vote>,
    new_votes: Coll<NewVote>,
    db_client: &State<Client>,
) -> Result<()> {
    let submitted = ballot_votes.0.votes;
    if submitted.is_empty() {
        return Err(Error::BadRequest("No votes submitted".to_string()));
    }

    let ballot = ballots
        .find_one(ballot_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Ballot {}", ballot_id)))?;

    // Gate on the voting window, distinguishing early from late for the UI.
    match ballot.voting_window(Utc::now()) {
        VotingWindow::NotYetOpen => {
            return Err(Error::Forbidden(
                "Voting has not started yet for this ballot".to_string(),
            ));
        }
        VotingWindow::Closed => {
            return Err(Error::Forbidden(
                "Voting is not open for this ballot".to_string(),
            ));
        }
        VotingWindow::Open => {}
    }

    // Every submitted measure must belong to this ballot.
    let known: HashSet<Id> = measures
        .find(doc! {"ballot_id": ballot_id}, None)
        .await?
        .try_collect::<Vec<Measure>>()
        .await?
        .into_iter()
        .map(|measure| measure.id)
        .collect();
    for vote in &submitted {
        if !known.contains(&vote.measure_id) {
            return Err(Error::not_found(format!(
                "Measure {} on ballot {}",
                vote.measure_id, ballot_id
            )));
        }
    }

    // Check every measure for an existing vote before inserting anything, so
    // a duplicate anywhere in the batch rejects the whole batch. This check
    // only exists for the friendly error: the unique index on
    // (ballot, measure, member) is what actually closes the race.
    let measure_ids: Vec<Id> = submitted.iter().map(|vote| vote.measure_id).collect();
    let already_voted = doc! {
        "ballot_id": ballot_id,
        "member_id": token.id(),
        "vote_type": VoteType::Electronic,
        "measure_id": { "$in": measure_ids },
    };
    if votes.find_one(already_voted, None).await?.is_some() {
        return Err(Error::Conflict(
            "Already voted on one or more measures".to_string(),
        ));
    }

    // All-or-nothing insert of the batch.
    let rows: Vec<NewVote> = submitted
        .iter()
        .map(|vote| VoteCore::electronic(ballot_id, vote.measure_id, token.id(), vote.vote_value))
        .collect();
    let result = async {
        let mut session = db_client.start_session(None).await?;
        session.start_transaction(None).await?;
        new_votes
            .insert_many_with_session(&rows, None, &mut session)
            .await?;
        session.commit_transaction().await
    }
    .await;
    match result {
        Ok(()) => Ok(()),
        // A concurrent request beat us to the unique index.
        Err(e) if is_duplicate_key_error(&e) => Err(Error::Conflict(
            "Already voted on one or more measures".to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}

#[post("/ballots/<ballot_id>/paper-votes", data = "<paper>", format = "json")]
pub async fn record_paper_votes(
    _token: AuthToken<Admin>,
    ballot_id: Id,
    paper: Json<PaperVotes>,
    ballots: Coll<Ballot>,
    measures: Coll<Measure>,
    votes: Coll<Vote>,
    new_votes: Coll<NewVote>,
    db_client: &State<Client>,
) -> Result<()> {
    let paper = paper.0;
    let measure_id = match paper.measure_id {
        Some(measure_id) => measure_id,
        None => {
            return Err(Error::BadRequest(
                "Missing measure_id or vote counts".to_string(),
            ));
        }
    };
    if paper.yes.is_none() && paper.no.is_none() && paper.abstain.is_none() {
        return Err(Error::BadRequest(
            "Missing measure_id or vote counts".to_string(),
        ));
    }

    ballots
        .find_one(ballot_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Ballot {}", ballot_id)))?;
    measures
        .find_one(
            doc! {"_id": measure_id, "ballot_id": ballot_id},
            None,
        )
        .await?
        .ok_or_else(|| {
            Error::not_found(format!("Measure {} on ballot {}", measure_id, ballot_id))
        })?;

    let rows = [
        VoteCore::paper(ballot_id, measure_id, VoteValue::Yes, paper.yes.unwrap_or(0)),
        VoteCore::paper(ballot_id, measure_id, VoteValue::No, paper.no.unwrap_or(0)),
        VoteCore::paper(
            ballot_id,
            measure_id,
            VoteValue::Abstain,
            paper.abstain.unwrap_or(0),
        ),
    ];

    // Replace the three paper rows atomically so a concurrent report never
    // sees the measure mid-update.
    let mut session = db_client.start_session(None).await?;
    session.start_transaction(None).await?;
    let existing_paper = doc! {
        "ballot_id": ballot_id,
        "measure_id": measure_id,
        "vote_type": VoteType::Paper,
    };
    votes
        .delete_many_with_session(existing_paper, None, &mut session)
        .await?;
    new_votes
        .insert_many_with_session(&rows, None, &mut session)
        .await?;
    session.commit_transaction().await?;

    Ok(())
}

#[get("/ballots/<ballot_id>/results")]
pub async fn get_results(
    _token: AuthToken<Member>,
    ballot_id: Id,
    ballots: Coll<Ballot>,
    measures: Coll<Measure>,
    votes: Coll<Vote>,
) -> Result<Json<BallotResults>> {
    ballots
        .find_one(ballot_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Ballot {}", ballot_id)))?;

    let (measure_list, vote_list) = ballot_rows(&measures, &votes, ballot_id).await?;
    Ok(Json(BallotResults {
        ballot_id,
        results: report::tally_results(&measure_list, &vote_list),
    }))
}

#[get("/ballots/<ballot_id>/report")]
pub async fn get_report(
    _token: AuthToken<Admin>,
    ballot_id: Id,
    ballots: Coll<Ballot>,
    measures: Coll<Measure>,
    votes: Coll<Vote>,
) -> Result<Json<BallotReport>> {
    let ballot = ballots
        .find_one(ballot_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Ballot {}", ballot_id)))?;

    let (measure_list, vote_list) = ballot_rows(&measures, &votes, ballot_id).await?;
    Ok(Json(report::report(&ballot, &measure_list, &vote_list)))
}

#[get("/ballots/<ballot_id>/audit")]
pub async fn get_audit(
    _token: AuthToken<Admin>,
    ballot_id: Id,
    ballots: Coll<Ballot>,
    votes: Coll<Vote>,
    members: Coll<Member>,
) -> Result<Json<BallotAudit>> {
    ballots
        .find_one(ballot_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Ballot {}", ballot_id)))?;

    let vote_list: Vec<Vote> = votes
        .find(doc! {"ballot_id": ballot_id}, None)
        .await?
        .try_collect()
        .await?;
    let turnout = report::turnout(&vote_list);

    // Join in usernames; voters since deleted are dropped from the trail.
    let voter_ids: Vec<Id> = turnout.iter().map(|(member_id, _)| *member_id).collect();
    let usernames: HashMap<Id, String> = members
        .find(doc! {"_id": {"$in": voter_ids}}, None)
        .await?
        .try_collect::<Vec<Member>>()
        .await?
        .into_iter()
        .map(|member| (member.id, member.member.username))
        .collect();

    let voters = turnout
        .into_iter()
        .filter_map(|(member_id, cast_at)| {
            usernames.get(&member_id).map(|username| AuditEntry {
                member_id,
                username: username.clone(),
                cast_at,
            })
        })
        .collect();

    Ok(Json(BallotAudit { ballot_id, voters }))
}

/// Fetch a ballot's measures and votes for tallying.
async fn ballot_rows(
    measures: &Coll<Measure>,
    votes: &Coll<Vote>,
    ballot_id: Id,
) -> Result<(Vec<Measure>, Vec<Vote>)> {
    let with_ballot = doc! {
        "ballot_id": ballot_id,
    };
    let measure_list: Vec<Measure> = measures
        .find(with_ballot.clone(), None)
        .await?
        .try_collect()
        .await?;
    let vote_list: Vec<Vote> = votes.find(with_ballot, None).await?.try_collect().await?;
    Ok((measure_list, vote_list))
}

#[cfg(test)]
mod tests {
    use mongodb::Database;
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::{serde_json, serde_json::json},
    };

    use crate::model::{
        api::auth::Credentials,
        db::{
            ballot::{BallotCore, MeasureCore, NewBallot, NewMeasure},
            member::NewMember,
            vote::VoteValue,
        },
        report::VoteTally,
    };

    use super::*;

    /// Insert a ballot and one measure directly, returning their IDs.
    async fn seed_ballot(db: &Database, ballot: BallotCore) -> (Id, Id) {
        let ballot_id: Id = Coll::<NewBallot>::from_db(db)
            .insert_one(ballot, None)
            .await
            .unwrap()
            .inserted_id
            .as_object_id()
            .unwrap()
            .into();
        let measure_id: Id = Coll::<NewMeasure>::from_db(db)
            .insert_one(MeasureCore::example(ballot_id), None)
            .await
            .unwrap()
            .inserted_id
            .as_object_id()
            .unwrap()
            .into();
        (ballot_id, measure_id)
    }

    async fn admin_id(db: &Database) -> Id {
        Coll::<Member>::from_db(db)
            .find_one(doc! {"username": "coordinator"}, None)
            .await
            .unwrap()
            .unwrap()
            .id
    }

    async fn cast(client: &Client, ballot_id: Id, measure_id: Id, value: &str) -> Status {
        client
            .post(uri!(cast_votes(ballot_id)))
            .header(ContentType::JSON)
            .body(
                json!({
                    "votes": [{ "measure_id": measure_id, "vote_value": value }],
                })
                .to_string(),
            )
            .dispatch()
            .await
            .status()
    }

    #[backend_test(member)]
    async fn duplicate_vote_rejected(client: Client, db: Database, votes: Coll<Vote>) {
        let creator = Id::new();
        let (ballot_id, measure_id) = seed_ballot(&db, BallotCore::current_example(creator)).await;

        // First vote succeeds.
        assert_eq!(cast(&client, ballot_id, measure_id, "yes").await, Status::Ok);
        // Voting again on the same measure is rejected with a conflict.
        assert_eq!(
            cast(&client, ballot_id, measure_id, "no").await,
            Status::Conflict
        );

        // Exactly one electronic row was stored.
        let stored: Vec<Vote> = votes
            .find(doc! {"measure_id": measure_id}, None)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].vote_value, VoteValue::Yes);
        assert_eq!(stored[0].vote_count, 1);
        assert_eq!(stored[0].vote_type, VoteType::Electronic);
    }

    #[backend_test(member)]
    async fn batch_duplicate_rejects_whole_batch(client: Client, db: Database, votes: Coll<Vote>) {
        let creator = Id::new();
        let (ballot_id, first) = seed_ballot(&db, BallotCore::current_example(creator)).await;
        let second: Id = Coll::<NewMeasure>::from_db(&db)
            .insert_one(MeasureCore::example2(ballot_id), None)
            .await
            .unwrap()
            .inserted_id
            .as_object_id()
            .unwrap()
            .into();

        // Vote on the first measure only.
        assert_eq!(cast(&client, ballot_id, first, "yes").await, Status::Ok);

        // A batch touching both measures fails entirely: no row for the
        // second measure may be written.
        let response = client
            .post(uri!(cast_votes(ballot_id)))
            .header(ContentType::JSON)
            .body(
                json!({
                    "votes": [
                        { "measure_id": second, "vote_value": "yes" },
                        { "measure_id": first, "vote_value": "yes" },
                    ],
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Conflict, response.status());

        let second_rows = votes
            .count_documents(doc! {"measure_id": second}, None)
            .await
            .unwrap();
        assert_eq!(second_rows, 0);
    }

    #[backend_test(member)]
    async fn window_gating(client: Client, db: Database) {
        let creator = Id::new();

        // Not yet open.
        let (future_ballot, future_measure) =
            seed_ballot(&db, BallotCore::future_example(creator)).await;
        assert_eq!(
            cast(&client, future_ballot, future_measure, "yes").await,
            Status::Forbidden
        );

        // Already closed.
        let (past_ballot, past_measure) = seed_ballot(&db, BallotCore::past_example(creator)).await;
        assert_eq!(
            cast(&client, past_ballot, past_measure, "yes").await,
            Status::Forbidden
        );

        // Open exactly at the start instant.
        let now = Utc::now();
        let at_start = BallotCore {
            start_time: now,
            end_time: now + chrono::Duration::hours(1),
            ..BallotCore::example_at(now, creator)
        };
        let (open_ballot, open_measure) = seed_ballot(&db, at_start).await;
        assert_eq!(
            cast(&client, open_ballot, open_measure, "yes").await,
            Status::Ok
        );
    }

    #[backend_test(member)]
    async fn empty_batch_rejected(client: Client, db: Database) {
        let (ballot_id, _) = seed_ballot(&db, BallotCore::current_example(Id::new())).await;
        let response = client
            .post(uri!(cast_votes(ballot_id)))
            .header(ContentType::JSON)
            .body(json!({ "votes": [] }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
    }

    #[backend_test(member)]
    async fn vote_on_missing_ballot(client: Client) {
        let response = client
            .post(uri!(cast_votes(Id::new())))
            .header(ContentType::JSON)
            .body(
                json!({
                    "votes": [{ "measure_id": Id::new(), "vote_value": "yes" }],
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
    }

    #[backend_test(member)]
    async fn vote_on_foreign_measure(client: Client, db: Database) {
        let creator = Id::new();
        let (ballot_id, _) = seed_ballot(&db, BallotCore::current_example(creator)).await;
        let (_, other_measure) = seed_ballot(&db, BallotCore::current_example(creator)).await;

        assert_eq!(
            cast(&client, ballot_id, other_measure, "yes").await,
            Status::NotFound
        );
    }

    #[backend_test(admin)]
    async fn paper_votes_replace_idempotently(client: Client, db: Database, votes: Coll<Vote>) {
        let (ballot_id, measure_id) =
            seed_ballot(&db, BallotCore::current_example(admin_id(&db).await)).await;

        // Record the same totals twice.
        for _ in 0..2 {
            let response = client
                .post(uri!(record_paper_votes(ballot_id)))
                .header(ContentType::JSON)
                .body(
                    json!({
                        "measure_id": measure_id,
                        "yes": 5,
                        "no": 3,
                        "abstain": 1,
                    })
                    .to_string(),
                )
                .dispatch()
                .await;
            assert_eq!(Status::Ok, response.status());
        }

        // Exactly three paper rows remain, not six.
        let stored: Vec<Vote> = votes
            .find(doc! {"measure_id": measure_id}, None)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(stored.len(), 3);
        let count_for = |value: VoteValue| {
            stored
                .iter()
                .find(|vote| vote.vote_value == value)
                .unwrap()
                .vote_count
        };
        assert_eq!(count_for(VoteValue::Yes), 5);
        assert_eq!(count_for(VoteValue::No), 3);
        assert_eq!(count_for(VoteValue::Abstain), 1);
        assert!(stored.iter().all(|vote| vote.member_id.is_none()));
    }

    #[backend_test(admin)]
    async fn paper_votes_require_counts(client: Client, db: Database) {
        let (ballot_id, measure_id) =
            seed_ballot(&db, BallotCore::current_example(admin_id(&db).await)).await;

        // No counts at all.
        let response = client
            .post(uri!(record_paper_votes(ballot_id)))
            .header(ContentType::JSON)
            .body(json!({ "measure_id": measure_id }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        // No measure.
        let response = client
            .post(uri!(record_paper_votes(ballot_id)))
            .header(ContentType::JSON)
            .body(json!({ "yes": 1 }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
    }

    #[backend_test(admin)]
    async fn full_reporting_scenario(client: Client, db: Database) {
        // Ballot with quorum 5 and threshold 50, one measure.
        let (ballot_id, measure_id) =
            seed_ballot(&db, BallotCore::current_example(admin_id(&db).await)).await;

        // A member votes yes.
        let members = Coll::<NewMember>::from_db(&db);
        members
            .insert_one(NewMember::example_member(), None)
            .await
            .unwrap();
        let login = client
            .post(uri!(crate::api::auth::login))
            .header(ContentType::JSON)
            .body(json!(Credentials::example_member()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, login.status());
        assert_eq!(cast(&client, ballot_id, measure_id, "yes").await, Status::Ok);

        // Voting again fails.
        assert_eq!(
            cast(&client, ballot_id, measure_id, "yes").await,
            Status::Conflict
        );

        // The admin records 4 paper yes votes.
        let admin_login = client
            .post(uri!(crate::api::auth::login))
            .header(ContentType::JSON)
            .body(json!(Credentials::example_admin()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, admin_login.status());
        let response = client
            .post(uri!(record_paper_votes(ballot_id)))
            .header(ContentType::JSON)
            .body(
                json!({
                    "measure_id": measure_id,
                    "yes": 4,
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        // Results: yes=5 (1 electronic + 4 paper), no=0, abstain=0.
        let response = client.get(uri!(get_results(ballot_id))).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let results: BallotResults =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(results.results.len(), 1);
        assert_eq!(
            results.results[0]
                .votes
                .iter()
                .find(|tally| tally.value == VoteValue::Yes)
                .unwrap(),
            &VoteTally {
                value: VoteValue::Yes,
                count: 5
            }
        );

        // Report: 5 voters, quorum met, measure accepted at 100% yes.
        let response = client.get(uri!(get_report(ballot_id))).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let report: BallotReport =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(report.total_voters, 5);
        assert!(report.quorum_met);
        assert_eq!(report.acceptance.len(), 1);
        assert!(report.acceptance[0].accepted);

        // Audit: the single electronic voter, no vote values anywhere.
        let response = client.get(uri!(get_audit(ballot_id))).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let raw = response.into_string().await.unwrap();
        assert!(!raw.contains("vote_value"));
        let audit: BallotAudit = serde_json::from_str(&raw).unwrap();
        assert_eq!(audit.voters.len(), 1);
        assert_eq!(audit.voters[0].username, "alice");
    }

    #[backend_test(member)]
    async fn report_requires_admin(client: Client, db: Database) {
        let (ballot_id, _) = seed_ballot(&db, BallotCore::current_example(Id::new())).await;
        let response = client.get(uri!(get_report(ballot_id))).dispatch().await;
        assert_eq!(Status::Forbidden, response.status());

        let response = client.get(uri!(get_audit(ballot_id))).dispatch().await;
        assert_eq!(Status::Forbidden, response.status());
    }
}
