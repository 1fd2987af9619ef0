use std::ops::Deref;

use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};
use rocket::{
    request::{self, FromRequest, Request},
    State,
};

use crate::model::db::{
    ballot::{Ballot, BallotCore, Measure, MeasureCore},
    branding::{Branding, BrandingCore, Setting},
    committee::{BallotCommittee, Committee, CommitteeCore, CommitteeMembership},
    member::{Member, MemberCore},
    vote::{Vote, VoteCore},
};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[rocket::async_trait]
impl<'r, T> FromRequest<'r> for Coll<T>
where
    T: MongoCollection,
{
    type Error = ();

    /// Get the database connection from the managed state and wrap it in a collection.
    ///
    /// Panics iff the [`Database`] is not managed by [`rocket::Rocket`].
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let db = req.guard::<&State<Database>>().await.unwrap();
        request::Outcome::Success(Coll::from_db(db))
    }
}

// Member collections
const MEMBERS: &str = "members";
impl MongoCollection for Member {
    const NAME: &'static str = MEMBERS;
}
impl MongoCollection for MemberCore {
    const NAME: &'static str = MEMBERS;
}

// Committee collections
const COMMITTEES: &str = "committees";
impl MongoCollection for Committee {
    const NAME: &'static str = COMMITTEES;
}
impl MongoCollection for CommitteeCore {
    const NAME: &'static str = COMMITTEES;
}

// Roster and visibility relations
impl MongoCollection for CommitteeMembership {
    const NAME: &'static str = "committee_memberships";
}
impl MongoCollection for BallotCommittee {
    const NAME: &'static str = "ballot_committees";
}

// Ballot collections
const BALLOTS: &str = "ballots";
impl MongoCollection for Ballot {
    const NAME: &'static str = BALLOTS;
}
impl MongoCollection for BallotCore {
    const NAME: &'static str = BALLOTS;
}

// Measure collections
const MEASURES: &str = "measures";
impl MongoCollection for Measure {
    const NAME: &'static str = MEASURES;
}
impl MongoCollection for MeasureCore {
    const NAME: &'static str = MEASURES;
}

// Vote collections
const VOTES: &str = "votes";
impl MongoCollection for Vote {
    const NAME: &'static str = VOTES;
}
impl MongoCollection for VoteCore {
    const NAME: &'static str = VOTES;
}

// Branding collections
const BRANDING: &str = "branding";
impl MongoCollection for Branding {
    const NAME: &'static str = BRANDING;
}
impl MongoCollection for BrandingCore {
    const NAME: &'static str = BRANDING;
}

// Settings collection
impl MongoCollection for Setting {
    const NAME: &'static str = "settings";
}

/// Ensure that all the required indexes exist on the given database.
///
/// The votes index is the source of truth for the one-electronic-vote-per-
/// member-per-measure invariant; the application-level check only exists to
/// produce a friendly error without a write.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // Member collection: usernames are unique (stored lowercase).
    let member_index = IndexModel::builder()
        .keys(doc! {"username": 1})
        .options(unique.clone())
        .build();
    Coll::<Member>::from_db(db)
        .create_index(member_index, None)
        .await?;

    // Committee roster: one row per (committee, member) pair.
    let membership_index = IndexModel::builder()
        .keys(doc! {"committee_id": 1, "member_id": 1})
        .options(unique.clone())
        .build();
    Coll::<CommitteeMembership>::from_db(db)
        .create_index(membership_index, None)
        .await?;

    // Ballot visibility: one row per (ballot, committee) pair.
    let assignment_index = IndexModel::builder()
        .keys(doc! {"ballot_id": 1, "committee_id": 1})
        .options(unique.clone())
        .build();
    Coll::<BallotCommittee>::from_db(db)
        .create_index(assignment_index, None)
        .await?;

    // Vote collection: at most one electronic vote per member per measure.
    // Paper rows have no member ID and are exempt via the partial filter.
    let electronic_only = IndexOptions::builder()
        .unique(true)
        .partial_filter_expression(doc! {"vote_type": "electronic"})
        .build();
    let vote_index = IndexModel::builder()
        .keys(doc! {"ballot_id": 1, "measure_id": 1, "member_id": 1})
        .options(electronic_only)
        .build();
    Coll::<Vote>::from_db(db)
        .create_index(vote_index, None)
        .await?;

    // Settings collection.
    let setting_index = IndexModel::builder()
        .keys(doc! {"key": 1})
        .options(unique)
        .build();
    Coll::<Setting>::from_db(db)
        .create_index(setting_index, None)
        .await?;

    Ok(())
}
