use std::fmt::Display;

use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::model::db::member::Member;

/// A kind of caller the API distinguishes, having minimum required rights.
pub trait User {
    /// The rights a token must carry to pass this guard.
    const RIGHTS: Rights;
}

/// Different privilege levels. Admins are members too, so rights are ordered
/// and a higher level satisfies any lower requirement.
#[derive(
    Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Serialize_repr, Deserialize_repr,
)]
#[repr(u8)]
pub enum Rights {
    Member = 0,
    Admin = 1,
}

impl Display for Rights {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}",
            match self {
                Self::Member => "member",
                Self::Admin => "admin",
            }
        )
    }
}

/// Any authenticated member.
impl User for Member {
    const RIGHTS: Rights = Rights::Member;
}

/// Marker for admin-only routes.
pub struct Admin;

impl User for Admin {
    const RIGHTS: Rights = Rights::Admin;
}
