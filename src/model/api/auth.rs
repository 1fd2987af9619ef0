use serde::{Deserialize, Serialize};

use crate::model::api::member::MemberView;

/// Username/password credentials, for registration and login.
#[derive(Debug, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// A self-service password change.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChangePassword {
    pub old_password: String,
    pub new_password: String,
}

/// Successful login: the JWT plus a view of the member it represents.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: MemberView,
}

/// Whether self-registration is currently enabled.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegistrationStatus {
    pub enabled: bool,
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Credentials {
        /// Matches [`crate::model::db::member::MemberCore::example_admin`].
        pub fn example_admin() -> Self {
            Self {
                username: "coordinator".to_string(),
                password: "c00rd1nat0r pa55word".to_string(),
            }
        }

        /// Matches [`crate::model::db::member::MemberCore::example_member`].
        pub fn example_member() -> Self {
            Self {
                username: "alice".to_string(),
                password: "curiouser and curiouser".to_string(),
            }
        }

        /// Matches [`crate::model::db::member::MemberCore::example_member2`].
        pub fn example_member2() -> Self {
            Self {
                username: "bob".to_string(),
                password: "b0b's excellent password".to_string(),
            }
        }
    }
}
