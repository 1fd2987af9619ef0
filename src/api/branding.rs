use rocket::{serde::json::Json, Route};

use crate::{
    error::Result,
    model::{
        auth::{Admin, AuthToken},
        db::branding::{Branding, BrandingCore, NewBranding},
        mongodb::Coll,
    },
};

pub fn routes() -> Vec<Route> {
    routes![get_branding, update_branding]
}

/// Branding is public so the login page can be styled before authentication.
#[get("/branding")]
pub async fn get_branding(branding: Coll<Branding>) -> Result<Json<BrandingCore>> {
    let current = branding.find_one(None, None).await?;
    Ok(Json(current.map(|b| b.branding).unwrap_or_default()))
}

#[put("/branding", data = "<update>", format = "json")]
pub async fn update_branding(
    _token: AuthToken<Admin>,
    update: Json<BrandingCore>,
    branding: Coll<Branding>,
    new_branding: Coll<NewBranding>,
) -> Result<Json<BrandingCore>> {
    // Single-document upsert.
    match branding.find_one(None, None).await? {
        Some(existing) => {
            new_branding
                .replace_one(existing.id.as_doc(), &update.0, None)
                .await?;
        }
        None => {
            new_branding.insert_one(&update.0, None).await?;
        }
    }
    Ok(Json(update.0))
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::{serde_json, serde_json::json},
    };

    use super::*;

    #[backend_test]
    async fn branding_defaults_when_unset(client: Client) {
        let response = client.get(uri!(get_branding)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let branding: BrandingCore =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(branding, BrandingCore::default());
        assert_eq!(branding.timezone, "UTC");
    }

    #[backend_test(admin)]
    async fn branding_update_round_trips(client: Client) {
        let response = client
            .put(uri!(update_branding))
            .header(ContentType::JSON)
            .body(
                json!({
                    "timezone": "Europe/London",
                    "bg_color": "#ffffff",
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let response = client.get(uri!(get_branding)).dispatch().await;
        let branding: BrandingCore =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(branding.timezone, "Europe/London");
        assert_eq!(branding.bg_color, "#ffffff");

        // A second update replaces rather than duplicates.
        let response = client
            .put(uri!(update_branding))
            .header(ContentType::JSON)
            .body(json!({ "timezone": "UTC" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let response = client.get(uri!(get_branding)).dispatch().await;
        let branding: BrandingCore =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(branding.timezone, "UTC");
    }

    #[backend_test(member)]
    async fn branding_update_requires_admin(client: Client) {
        let response = client
            .put(uri!(update_branding))
            .header(ContentType::JSON)
            .body(json!({ "timezone": "UTC" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
    }
}
