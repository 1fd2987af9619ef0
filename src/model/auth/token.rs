use std::marker::PhantomData;

use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use mongodb::Database;
use rocket::{
    http::{Cookie, SameSite, Status},
    request::{FromRequest, Outcome},
    time::Duration,
    Request, State,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;
use crate::model::{
    db::member::Member,
    mongodb::{Coll, Id},
};

use super::user::{Rights, User};

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// An authentication token representing a specific member with specific rights.
#[derive(Serialize, Deserialize)]
pub struct AuthToken<U> {
    id: Id,
    #[serde(rename = "rgt")]
    rights: Rights,
    #[serde(skip)]
    phantom: PhantomData<U>,
}

impl AuthToken<Member> {
    /// Create a token for the given member, with admin rights iff they hold them.
    pub fn for_member(member: &Member) -> Self {
        Self {
            id: member.id,
            rights: if member.is_admin {
                Rights::Admin
            } else {
                Rights::Member
            },
            phantom: PhantomData,
        }
    }
}

impl<U> AuthToken<U> {
    /// The ID of the member this token represents.
    pub fn id(&self) -> Id {
        self.id
    }

    /// Does this token carry admin rights?
    pub fn is_admin(&self) -> bool {
        self.rights == Rights::Admin
    }

    /// Does this token carry at least the given rights?
    pub fn permits(&self, target: Rights) -> bool {
        self.rights >= target
    }
}

impl<U> AuthToken<U>
where
    U: User,
{
    /// Serialize this token into a signed JWT.
    #[allow(clippy::missing_panics_doc)]
    pub fn to_jwt(&self, config: &Config) -> String {
        let claims = Claims {
            token: self,
            expire_at: Utc::now() + config.auth_ttl(),
        };
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )
        .expect("JWT encoding is infallible with default settings")
    }

    /// Serialize this token into an auth cookie.
    pub fn into_cookie(self, config: &Config) -> Cookie<'static> {
        let jwt = self.to_jwt(config);
        Cookie::build(AUTH_TOKEN_COOKIE, jwt)
            .max_age(Duration::seconds(config.auth_ttl().num_seconds()))
            .http_only(true)
            .same_site(SameSite::Strict)
            .finish()
    }

    /// Deserialize and verify a JWT.
    pub fn from_jwt(jwt: &str, config: &Config) -> Result<Self, Error> {
        let token = jsonwebtoken::decode(
            jwt,
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<OwnedClaims<U>>| claims.claims.token)?;
        Ok(token)
    }
}

/// JWT claims: the token itself plus an expiry datetime.
#[derive(Serialize)]
struct Claims<'a, U> {
    #[serde(flatten, bound = "")]
    token: &'a AuthToken<U>,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct OwnedClaims<U> {
    #[serde(flatten, bound = "")]
    token: AuthToken<U>,
    #[serde(rename = "exp", with = "ts_seconds")]
    #[allow(dead_code)]
    expire_at: DateTime<Utc>,
}

#[rocket::async_trait]
impl<'r, U> FromRequest<'r> for AuthToken<U>
where
    U: User + Send,
{
    type Error = Error;

    /// Get an [`AuthToken`] from the `Authorization: Bearer` header (or the
    /// auth cookie set at login) and verify it has the rights this route
    /// requires and that the member still exists with those rights.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        // Unwrap is safe as `Config` is always managed.
        let config = req.guard::<&State<Config>>().await.unwrap();

        // The bearer header takes precedence over the login cookie.
        let jwt = req
            .headers()
            .get_one("Authorization")
            .and_then(|header| header.strip_prefix("Bearer "))
            .map(str::to_string)
            .or_else(|| {
                req.cookies()
                    .get(AUTH_TOKEN_COOKIE)
                    .map(|cookie| cookie.value().to_string())
            });
        let jwt = match jwt {
            Some(jwt) => jwt,
            None => {
                return Outcome::Failure((
                    Status::Unauthorized,
                    Error::Unauthorized("No auth token provided".to_string()),
                ));
            }
        };

        // Decode the token.
        let token = match Self::from_jwt(&jwt, config) {
            Ok(token) => token,
            Err(e) => return Outcome::Failure((Status::Unauthorized, e)),
        };

        // Check it represents sufficient rights.
        if !token.permits(U::RIGHTS) {
            return Outcome::Failure((
                Status::Forbidden,
                Error::Forbidden(format!("This route requires {} rights", U::RIGHTS)),
            ));
        }

        // Check the member still exists and still holds the claimed rights.
        let db = req.guard::<&State<Database>>().await.unwrap();
        let member = Coll::<Member>::from_db(db)
            .find_one(token.id.as_doc(), None)
            .await;
        match member {
            Ok(Some(member)) => {
                if U::RIGHTS == Rights::Admin && !member.is_admin {
                    Outcome::Failure((
                        Status::Forbidden,
                        Error::Forbidden("Admin rights have been revoked".to_string()),
                    ))
                } else {
                    Outcome::Success(token)
                }
            }
            Ok(None) => Outcome::Failure((
                Status::Unauthorized,
                Error::Unauthorized(format!("No member found with ID {}", token.id)),
            )),
            Err(e) => Outcome::Failure((Status::InternalServerError, e.into())),
        }
    }
}
