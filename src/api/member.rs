use mongodb::bson::{doc, Document};
use rocket::{futures::TryStreamExt, serde::json::Json, Route};

use crate::{
    error::{Error, Result},
    model::{
        api::member::{MemberView, NewMemberRequest, UpdateMemberRequest},
        auth::{Admin, AuthToken},
        db::member::{hash_password, Member, MemberCore, NewMember},
        mongodb::{is_duplicate_key_error, Coll, Id},
    },
};

pub fn routes() -> Vec<Route> {
    routes![get_members, create_member, update_member, delete_member]
}

#[get("/members")]
pub async fn get_members(
    _token: AuthToken<Admin>,
    members: Coll<Member>,
) -> Result<Json<Vec<MemberView>>> {
    let member_list: Vec<Member> = members.find(None, None).await?.try_collect().await?;
    Ok(Json(member_list.into_iter().map(Into::into).collect()))
}

#[post("/members", data = "<new_member>", format = "json")]
pub async fn create_member(
    _token: AuthToken<Admin>,
    new_member: Json<NewMemberRequest>,
    members: Coll<Member>,
    new_members: Coll<NewMember>,
) -> Result<Json<MemberView>> {
    let request = new_member.0;
    let (username, password) = match (request.username, request.password) {
        (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
            (username, password)
        }
        _ => {
            return Err(Error::BadRequest(
                "Username and password required".to_string(),
            ));
        }
    };

    let member = MemberCore::new(&username, &password, request.is_admin)?;
    let new_id: Id = match new_members.insert_one(&member, None).await {
        Ok(result) => result
            .inserted_id
            .as_object_id()
            .unwrap() // Valid because the ID comes directly from the DB.
            .into(),
        Err(e) if is_duplicate_key_error(&e) => {
            return Err(Error::Conflict(format!(
                "Username already exists: {}",
                member.username
            )));
        }
        Err(e) => return Err(e.into()),
    };

    let member = members.find_one(new_id.as_doc(), None).await?.unwrap();
    Ok(Json(member.into()))
}

#[put("/members/<member_id>", data = "<update>", format = "json")]
pub async fn update_member(
    _token: AuthToken<Admin>,
    member_id: Id,
    update: Json<UpdateMemberRequest>,
    members: Coll<Member>,
) -> Result<Json<MemberView>> {
    let request = update.0;

    // Only the supplied fields are touched.
    let mut set = Document::new();
    if let Some(username) = request.username.filter(|u| !u.is_empty()) {
        set.insert("username", username.to_lowercase());
    }
    if let Some(is_admin) = request.is_admin {
        set.insert("is_admin", is_admin);
    }
    if let Some(password) = request.password.filter(|p| !p.is_empty()) {
        set.insert("password_hash", hash_password(&password)?);
    }
    if set.is_empty() {
        return Err(Error::BadRequest("No fields to update".to_string()));
    }

    let result = members
        .update_one(member_id.as_doc(), doc! { "$set": set }, None)
        .await;
    let result = match result {
        Ok(result) => result,
        Err(e) if is_duplicate_key_error(&e) => {
            return Err(Error::Conflict("Username already exists".to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    if result.matched_count == 0 {
        return Err(Error::not_found(format!("Member {}", member_id)));
    }

    let member = members.find_one(member_id.as_doc(), None).await?.unwrap();
    Ok(Json(member.into()))
}

#[delete("/members/<member_id>")]
pub async fn delete_member(
    _token: AuthToken<Admin>,
    member_id: Id,
    members: Coll<Member>,
) -> Result<()> {
    let result = members.delete_one(member_id.as_doc(), None).await?;
    if result.deleted_count == 0 {
        return Err(Error::not_found(format!("Member {}", member_id)));
    }
    Ok(())
}
