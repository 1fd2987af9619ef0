use mongodb::bson::doc;
use rocket::{
    http::{Cookie, CookieJar, Status},
    serde::json::Json,
    Route, State,
};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            auth::{ChangePassword, Credentials, LoginResponse, RegistrationStatus},
            member::MemberView,
        },
        auth::{Admin, AuthToken, AUTH_TOKEN_COOKIE},
        db::{
            branding::{registration_enabled, set_registration_enabled, Setting},
            member::{hash_password, Member, MemberCore, NewMember},
        },
        mongodb::{is_duplicate_key_error, Coll, Id},
    },
    Config,
};

pub fn routes() -> Vec<Route> {
    routes![
        register,
        login,
        logout,
        change_password,
        registration_status,
        set_registration_status,
    ]
}

#[post("/auth/register", data = "<credentials>", format = "json")]
pub async fn register(
    credentials: Json<Credentials>,
    members: Coll<Member>,
    new_members: Coll<NewMember>,
    settings: Coll<Setting>,
) -> Result<Json<MemberView>> {
    if !registration_enabled(&settings).await? {
        return Err(Error::Forbidden(
            "Registration is currently disabled".to_string(),
        ));
    }
    if credentials.username.is_empty() || credentials.password.is_empty() {
        return Err(Error::BadRequest(
            "Username and password required".to_string(),
        ));
    }

    // Self-registration never grants admin rights.
    let member = MemberCore::new(&credentials.username, &credentials.password, false)?;
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

#[post("/auth/login", data = "<credentials>", format = "json")]
pub async fn login(
    credentials: Json<Credentials>,
    cookies: &CookieJar<'_>,
    members: Coll<Member>,
    config: &State<Config>,
) -> Result<Json<LoginResponse>> {
    let with_username = doc! {
        "username": credentials.username.to_lowercase(),
    };

    let member = members
        .find_one(with_username, None)
        .await?
        .filter(|member| member.verify_password(&credentials.password))
        .ok_or_else(|| Error::Unauthorized("Invalid credentials".to_string()))?;

    let token = AuthToken::for_member(&member);
    let jwt = token.to_jwt(config);
    cookies.add(token.into_cookie(config));

    Ok(Json(LoginResponse {
        token: jwt,
        user: member.into(),
    }))
}

#[delete("/auth")]
pub fn logout(cookies: &CookieJar) -> Status {
    cookies.remove(Cookie::named(AUTH_TOKEN_COOKIE));
    Status::Ok
}

#[post("/auth/change-password", data = "<change>", format = "json")]
pub async fn change_password(
    token: AuthToken<Member>,
    change: Json<ChangePassword>,
    members: Coll<Member>,
) -> Result<()> {
    if change.old_password.is_empty() || change.new_password.is_empty() {
        return Err(Error::BadRequest("Missing fields".to_string()));
    }

    let member = members
        .find_one(token.id().as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Member {}", token.id())))?;

    if !member.verify_password(&change.old_password) {
        return Err(Error::Forbidden("Current password is incorrect".to_string()));
    }

    let update = doc! {
        "$set": {
            "password_hash": hash_password(&change.new_password)?,
        }
    };
    members.update_one(token.id().as_doc(), update, None).await?;
    Ok(())
}

#[get("/registration-enabled")]
pub async fn registration_status(settings: Coll<Setting>) -> Result<Json<RegistrationStatus>> {
    Ok(Json(RegistrationStatus {
        enabled: registration_enabled(&settings).await?,
    }))
}

#[post("/registration-enabled", data = "<status>", format = "json")]
pub async fn set_registration_status(
    _token: AuthToken<Admin>,
    status: Json<RegistrationStatus>,
    settings: Coll<Setting>,
) -> Result<Json<RegistrationStatus>> {
    set_registration_enabled(&settings, status.enabled).await?;
    Ok(Json(RegistrationStatus {
        enabled: registration_enabled(&settings).await?,
    }))
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::ContentType,
        local::asynchronous::Client,
        serde::json::{serde_json, serde_json::json},
    };

    use super::*;

    #[backend_test]
    async fn register_and_login(client: Client, members: Coll<Member>) {
        // Register a new member.
        let response = client
            .post(uri!(register))
            .header(ContentType::JSON)
            .body(json!(Credentials::example_member()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        // The stored member is a non-admin with a lowercased username.
        let member = members
            .find_one(doc! {"username": "alice"}, None)
            .await
            .unwrap()
            .unwrap();
        assert!(!member.is_admin);
        assert!(member.verify_password(&Credentials::example_member().password));

        // Login with the same credentials.
        let response = client
            .post(uri!(login))
            .header(ContentType::JSON)
            .body(json!(Credentials::example_member()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_some());

        let body: LoginResponse =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert!(!body.token.is_empty());
        assert_eq!(body.user.username, "alice");
    }

    #[backend_test]
    async fn register_duplicate_username(client: Client) {
        let response = client
            .post(uri!(register))
            .header(ContentType::JSON)
            .body(json!(Credentials::example_member()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        // Usernames are case-insensitive, so ALICE collides with alice.
        let response = client
            .post(uri!(register))
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": "ALICE",
                    "password": "another password",
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Conflict, response.status());
    }

    #[backend_test]
    async fn register_disabled(client: Client, settings: Coll<Setting>) {
        set_registration_enabled(&settings, false).await.unwrap();

        let response = client
            .post(uri!(register))
            .header(ContentType::JSON)
            .body(json!(Credentials::example_member()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
    }

    #[backend_test]
    async fn login_invalid_credentials(client: Client, members: Coll<NewMember>) {
        members
            .insert_one(NewMember::example_member(), None)
            .await
            .unwrap();

        // Wrong password.
        let response = client
            .post(uri!(login))
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": "alice",
                    "password": "not the password",
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());
        assert_eq!(None, client.cookies().get(AUTH_TOKEN_COOKIE));

        // Unknown username.
        let response = client
            .post(uri!(login))
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": "nobody",
                    "password": "password",
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());
    }

    #[backend_test(member)]
    async fn change_password_flow(client: Client) {
        // Wrong current password is rejected.
        let response = client
            .post(uri!(change_password))
            .header(ContentType::JSON)
            .body(
                json!({
                    "old_password": "wrong",
                    "new_password": "new password",
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());

        // Correct current password changes it.
        let response = client
            .post(uri!(change_password))
            .header(ContentType::JSON)
            .body(
                json!({
                    "old_password": Credentials::example_member().password,
                    "new_password": "new password",
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        // The new password now logs in.
        let response = client
            .post(uri!(login))
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": Credentials::example_member().username,
                    "password": "new password",
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
    }

    #[backend_test]
    async fn logout_clears_cookie(client: Client) {
        let response = client.delete(uri!(logout)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        assert_eq!(None, client.cookies().get(AUTH_TOKEN_COOKIE));
    }

    #[backend_test(admin)]
    async fn registration_toggle(client: Client) {
        // Enabled by default.
        let response = client.get(uri!(registration_status)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let status: RegistrationStatus =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert!(status.enabled);

        // Disable it.
        let response = client
            .post(uri!(set_registration_status))
            .header(ContentType::JSON)
            .body(json!({ "enabled": false }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let status: RegistrationStatus =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert!(!status.enabled);
    }

    #[backend_test]
    async fn registration_toggle_requires_admin(client: Client) {
        let response = client
            .post(uri!(set_registration_status))
            .header(ContentType::JSON)
            .body(json!({ "enabled": false }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());
    }
}
