use std::collections::HashMap;

use mongodb::{bson::doc, Client};
use rocket::{futures::TryStreamExt, serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    model::{
        api::committee::{CommitteeSpec, CommitteeView, RosterAddRequest, RosterEntry},
        auth::{Admin, AuthToken},
        db::{
            committee::{BallotCommittee, Committee, CommitteeCore, CommitteeMembership, NewCommittee},
            member::Member,
        },
        mongodb::{is_duplicate_key_error, Coll, Id},
    },
};

pub fn routes() -> Vec<Route> {
    routes![
        list_committees,
        create_committee,
        rename_committee,
        delete_committee,
        add_roster_member,
        remove_roster_member,
    ]
}

#[get("/committees")]
pub async fn list_committees(
    _token: AuthToken<Member>,
    committees: Coll<Committee>,
    memberships: Coll<CommitteeMembership>,
    members: Coll<Member>,
) -> Result<Json<Vec<CommitteeView>>> {
    let committee_list: Vec<Committee> = committees.find(None, None).await?.try_collect().await?;
    let links: Vec<CommitteeMembership> = memberships.find(None, None).await?.try_collect().await?;
    let member_list: Vec<Member> = members.find(None, None).await?.try_collect().await?;

    // Attach each committee's roster.
    let usernames: HashMap<Id, String> = member_list
        .into_iter()
        .map(|member| (member.id, member.member.username))
        .collect();
    let mut rosters: HashMap<Id, Vec<RosterEntry>> = HashMap::new();
    for link in links {
        // Roster rows for since-deleted members are silently dropped.
        if let Some(username) = usernames.get(&link.member_id) {
            rosters.entry(link.committee_id).or_default().push(RosterEntry {
                id: link.member_id,
                username: username.clone(),
            });
        }
    }

    Ok(Json(
        committee_list
            .into_iter()
            .map(|committee| {
                let roster = rosters.remove(&committee.id).unwrap_or_default();
                CommitteeView::new(committee, roster)
            })
            .collect(),
    ))
}

#[post("/committees", data = "<spec>", format = "json")]
pub async fn create_committee(
    _token: AuthToken<Admin>,
    spec: Json<CommitteeSpec>,
    committees: Coll<Committee>,
    new_committees: Coll<NewCommittee>,
) -> Result<Json<CommitteeView>> {
    let spec = spec.0;
    let name = match spec.name.filter(|name| !name.is_empty()) {
        Some(name) => name,
        None => return Err(Error::BadRequest("Committee name required".to_string())),
    };

    let committee = CommitteeCore {
        name,
        description: spec.description,
    };
    let new_id: Id = new_committees
        .insert_one(&committee, None)
        .await?
        .inserted_id
        .as_object_id()
        .unwrap() // Valid because the ID comes directly from the DB.
        .into();

    let committee = committees.find_one(new_id.as_doc(), None).await?.unwrap();
    Ok(Json(CommitteeView::new(committee, Vec::new())))
}

#[put("/committees/<committee_id>", data = "<spec>", format = "json")]
pub async fn rename_committee(
    _token: AuthToken<Admin>,
    committee_id: Id,
    spec: Json<CommitteeSpec>,
    committees: Coll<Committee>,
) -> Result<Json<CommitteeView>> {
    let spec = spec.0;
    let name = match spec.name.filter(|name| !name.is_empty()) {
        Some(name) => name,
        None => return Err(Error::BadRequest("Committee name required".to_string())),
    };

    let update = doc! {
        "$set": {
            "name": name,
            "description": spec.description,
        }
    };
    let result = committees
        .update_one(committee_id.as_doc(), update, None)
        .await?;
    if result.matched_count == 0 {
        return Err(Error::not_found(format!("Committee {}", committee_id)));
    }

    let committee = committees
        .find_one(committee_id.as_doc(), None)
        .await?
        .unwrap();
    Ok(Json(CommitteeView::new(committee, Vec::new())))
}

#[delete("/committees/<committee_id>")]
pub async fn delete_committee(
    _token: AuthToken<Admin>,
    committee_id: Id,
    committees: Coll<Committee>,
    memberships: Coll<CommitteeMembership>,
    assignments: Coll<BallotCommittee>,
    db_client: &State<Client>,
) -> Result<()> {
    // Check it exists first for a friendly 404.
    committees
        .find_one(committee_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Committee {}", committee_id)))?;

    // Atomically remove the committee and its relation rows. Members and
    // ballots themselves are left untouched.
    let mut session = db_client.start_session(None).await?;
    session.start_transaction(None).await?;

    let with_committee = doc! {
        "committee_id": committee_id,
    };
    memberships
        .delete_many_with_session(with_committee.clone(), None, &mut session)
        .await?;
    assignments
        .delete_many_with_session(with_committee, None, &mut session)
        .await?;
    committees
        .delete_one_with_session(committee_id.as_doc(), None, &mut session)
        .await?;

    session.commit_transaction().await?;
    Ok(())
}

#[post("/committees/<committee_id>/members", data = "<request>", format = "json")]
pub async fn add_roster_member(
    _token: AuthToken<Admin>,
    committee_id: Id,
    request: Json<RosterAddRequest>,
    committees: Coll<Committee>,
    members: Coll<Member>,
    memberships: Coll<CommitteeMembership>,
) -> Result<()> {
    let member_id = match request.0.member_id {
        Some(member_id) => member_id,
        None => return Err(Error::BadRequest("Member ID required".to_string())),
    };

    committees
        .find_one(committee_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Committee {}", committee_id)))?;
    members
        .find_one(member_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Member {}", member_id)))?;

    let membership = CommitteeMembership {
        committee_id,
        member_id,
    };
    match memberships.insert_one(membership, None).await {
        Ok(_) => Ok(()),
        // Adding an existing roster member is a no-op.
        Err(e) if is_duplicate_key_error(&e) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[delete("/committees/<committee_id>/members/<member_id>")]
pub async fn remove_roster_member(
    _token: AuthToken<Admin>,
    committee_id: Id,
    member_id: Id,
    memberships: Coll<CommitteeMembership>,
) -> Result<()> {
    let filter = doc! {
        "committee_id": committee_id,
        "member_id": member_id,
    };
    memberships.delete_one(filter, None).await?;
    Ok(())
}
