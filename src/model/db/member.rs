use std::ops::{Deref, DerefMut};

use argon2::Error as Argon2Error;
use chrono::{DateTime, Utc};
use mongodb::bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::mongodb::{Coll, Id};

/// Username of the admin account created on first launch.
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";

/// Password of the admin account created on first launch.
/// Deployments are expected to change this immediately.
const DEFAULT_ADMIN_PASSWORD: &str = "admin";

/// Core member data, as stored in the database.
/// Usernames are case-insensitive and always stored lowercase.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberCore {
    pub username: String,
    pub password_hash: String,
    pub is_admin: bool,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl MemberCore {
    /// Create a new member with a freshly-salted password hash.
    pub fn new(username: &str, password: &str, is_admin: bool) -> Result<Self, Argon2Error> {
        Ok(Self {
            username: username.to_lowercase(),
            password_hash: hash_password(password)?,
            is_admin,
            created_at: Utc::now(),
        })
    }

    /// Check whether the given password is correct.
    pub fn verify_password<T: AsRef<[u8]>>(&self, password: T) -> bool {
        argon2::verify_encoded(&self.password_hash, password.as_ref()).unwrap_or(false)
    }
}

/// Hash a password for storage.
pub fn hash_password(password: &str) -> Result<String, Argon2Error> {
    let salt: [u8; 16] = rand::random();
    argon2::hash_encoded(password.as_bytes(), &salt, &argon2::Config::default())
}

/// A member without an ID.
pub type NewMember = MemberCore;

/// A member from the database, with its unique ID.
#[derive(Debug, Serialize, Deserialize)]
pub struct Member {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub member: MemberCore,
}

impl Deref for Member {
    type Target = MemberCore;

    fn deref(&self) -> &Self::Target {
        &self.member
    }
}

impl DerefMut for Member {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.member
    }
}

/// Ensure at least one admin member exists, creating the default one if not.
pub async fn ensure_admin_exists(members: &Coll<NewMember>) -> Result<()> {
    let filter = doc! {
        "is_admin": true,
    };
    if members.find_one(filter, None).await?.is_none() {
        let admin = MemberCore::new(DEFAULT_ADMIN_USERNAME, DEFAULT_ADMIN_PASSWORD, true)?;
        members.insert_one(admin, None).await?;
        warn!("No admin account found; created default admin. CHANGE ITS PASSWORD NOW!");
    }
    Ok(())
}
