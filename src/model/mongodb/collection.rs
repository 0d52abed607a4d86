use std::ops::Deref;
use std::time::Duration;

use log::debug;
use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};
use rocket::{
    request::{self, FromRequest, Request},
    State,
};

use crate::model::db::{
    contact::{ContactMessage, NewContactMessage},
    election::{Election, NewElection},
    password_reset::{NewPasswordReset, PasswordReset},
    review::{NewReview, Review},
    user::{NewUser, User},
    vote::{NewVote, Vote},
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

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
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

// User collections
const USERS: &str = "users";
impl MongoCollection for User {
    const NAME: &'static str = USERS;
}
impl MongoCollection for NewUser {
    const NAME: &'static str = USERS;
}

// Election collections
const ELECTIONS: &str = "elections";
impl MongoCollection for Election {
    const NAME: &'static str = ELECTIONS;
}
impl MongoCollection for NewElection {
    const NAME: &'static str = ELECTIONS;
}

// Vote collections
const VOTES: &str = "votes";
impl MongoCollection for Vote {
    const NAME: &'static str = VOTES;
}
impl MongoCollection for NewVote {
    const NAME: &'static str = VOTES;
}

// Review collections
const REVIEWS: &str = "reviews";
impl MongoCollection for Review {
    const NAME: &'static str = REVIEWS;
}
impl MongoCollection for NewReview {
    const NAME: &'static str = REVIEWS;
}

// Password reset collections
const PASSWORD_RESETS: &str = "password_resets";
impl MongoCollection for PasswordReset {
    const NAME: &'static str = PASSWORD_RESETS;
}
impl MongoCollection for NewPasswordReset {
    const NAME: &'static str = PASSWORD_RESETS;
}

// Contact message collections
const CONTACT_MESSAGES: &str = "contact_messages";
impl MongoCollection for ContactMessage {
    const NAME: &'static str = CONTACT_MESSAGES;
}
impl MongoCollection for NewContactMessage {
    const NAME: &'static str = CONTACT_MESSAGES;
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // User collection.
    let user_index = IndexModel::builder()
        .keys(doc! {"email": 1})
        .options(unique.clone())
        .build();
    Coll::<User>::from_db(db)
        .create_index(user_index, None)
        .await?;

    // Election collection.
    let owner_index = IndexModel::builder()
        .keys(doc! {"owner_id": 1, "created_at": -1})
        .build();
    let status_index = IndexModel::builder().keys(doc! {"status": 1}).build();
    Coll::<Election>::from_db(db)
        .create_indexes([owner_index, status_index], None)
        .await?;

    // Vote collection. One ballot per voter per election is enforced here.
    let vote_index = IndexModel::builder()
        .keys(doc! {"election_id": 1, "voter_id": 1})
        .options(unique.clone())
        .build();
    Coll::<Vote>::from_db(db)
        .create_index(vote_index, None)
        .await?;

    // Review collection.
    let review_index = IndexModel::builder()
        .keys(doc! {"created_at": -1})
        .build();
    Coll::<Review>::from_db(db)
        .create_index(review_index, None)
        .await?;

    // Password reset collection: tokens are unique and expire automatically.
    let token_index = IndexModel::builder()
        .keys(doc! {"token_hmac": 1})
        .options(unique)
        .build();
    let expiry_index = IndexModel::builder()
        .keys(doc! {"expire_at": 1})
        .options(
            IndexOptions::builder()
                .expire_after(Duration::from_secs(0))
                .build(),
        )
        .build();
    Coll::<PasswordReset>::from_db(db)
        .create_indexes([token_index, expiry_index], None)
        .await?;

    Ok(())
}
