use std::ops::{Deref, DerefMut};

use mongodb::bson::doc;
use mongodb::options::UpdateOptions;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::mongodb::{Coll, Id};

/// Organisation branding, a single document. Only display metadata lives
/// here; the core never reads anything except `timezone`, and that only for
/// presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandingCore {
    #[serde(default)]
    pub fqdn: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub bg_color: String,
    #[serde(default)]
    pub nav_color: String,
    #[serde(default)]
    pub nav_text_color: String,
    #[serde(default)]
    pub text_color: String,
    #[serde(default)]
    pub button_color: String,
    #[serde(default)]
    pub box_border_color: String,
    #[serde(default)]
    pub box_shadow_color: String,
    #[serde(default)]
    pub box_bg_color: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for BrandingCore {
    fn default() -> Self {
        Self {
            fqdn: String::new(),
            timezone: default_timezone(),
            bg_color: String::new(),
            nav_color: String::new(),
            nav_text_color: String::new(),
            text_color: String::new(),
            button_color: String::new(),
            box_border_color: String::new(),
            box_shadow_color: String::new(),
            box_bg_color: String::new(),
        }
    }
}

/// Branding without an ID.
pub type NewBranding = BrandingCore;

/// The branding document from the database.
#[derive(Debug, Serialize, Deserialize)]
pub struct Branding {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub branding: BrandingCore,
}

impl Deref for Branding {
    type Target = BrandingCore;

    fn deref(&self) -> &Self::Target {
        &self.branding
    }
}

impl DerefMut for Branding {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.branding
    }
}

/// A key-value application setting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

/// Settings key gating self-registration.
pub const REGISTRATION_ENABLED: &str = "registrationEnabled";

/// Is self-registration currently enabled? Defaults to true when unset.
pub async fn registration_enabled(settings: &Coll<Setting>) -> Result<bool> {
    let filter = doc! {
        "key": REGISTRATION_ENABLED,
    };
    let setting = settings.find_one(filter, None).await?;
    Ok(setting.map_or(true, |s| s.value == "true"))
}

/// Enable or disable self-registration.
pub async fn set_registration_enabled(settings: &Coll<Setting>, enabled: bool) -> Result<()> {
    let filter = doc! {
        "key": REGISTRATION_ENABLED,
    };
    let update = doc! {
        "$set": {
            "value": if enabled { "true" } else { "false" },
        }
    };
    let options = UpdateOptions::builder().upsert(true).build();
    settings.update_one(filter, update, options).await?;
    Ok(())
}
