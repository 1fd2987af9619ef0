use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{db::member::Member, mongodb::Id};

/// A member as presented over the API. Never includes the password hash.
#[derive(Debug, Serialize, Deserialize)]
pub struct MemberView {
    pub id: Id,
    pub username: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Member> for MemberView {
    fn from(member: Member) -> Self {
        Self {
            id: member.id,
            username: member.member.username,
            is_admin: member.member.is_admin,
            created_at: member.member.created_at,
        }
    }
}

/// Admin request to create a member.
#[derive(Debug, Serialize, Deserialize)]
pub struct NewMemberRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

/// Admin request to edit a member. Absent fields are left unchanged.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateMemberRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub is_admin: Option<bool>,
}
