use std::marker::PhantomData;

use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use mongodb::{bson::doc, Database};
use rocket::{
    http::Status,
    outcome::try_outcome,
    request::{FromRequest, Outcome},
    Request, State,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    db::{
        election::{Election, Voter},
        user::User as Account,
    },
    mongodb::{Coll, Id},
};

use super::user::{Role, User};

const BEARER_PREFIX: &str = "Bearer ";

/// Bearer token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// The account or voter ID.
    pub sub: String,
    pub email: String,
    pub role: Role,
    /// The election a voter token is scoped to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub election: Option<String>,
    #[serde(rename = "exp", with = "ts_seconds")]
    pub expire_at: DateTime<Utc>,
}

impl Claims {
    /// Claims for an account holder, with the account's current role.
    pub fn for_account(account: &Account, config: &Config) -> Self {
        Self {
            sub: account.id.to_string(),
            email: account.email.to_string(),
            role: account.role,
            election: None,
            expire_at: Utc::now() + config.auth_ttl(),
        }
    }

    /// Claims for a voter of the given election.
    pub fn for_voter(election_id: Id, voter: &Voter, config: &Config) -> Self {
        Self {
            sub: voter.id.to_string(),
            email: voter.email.to_string(),
            role: Role::Voter,
            election: Some(election_id.to_string()),
            expire_at: Utc::now() + config.auth_ttl(),
        }
    }

    /// Sign these claims into a token.
    pub fn encode(&self, config: &Config) -> Result<String> {
        Ok(jsonwebtoken::encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(config.jwt_secret()),
        )?)
    }

    /// Verify and decode a token.
    pub fn decode(token: &str, config: &Config) -> Result<Self> {
        let data = jsonwebtoken::decode::<Self>(
            token,
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )?;
        Ok(data.claims)
    }

    pub fn subject(&self) -> Result<Id> {
        self.sub
            .parse()
            .map_err(|_| Error::unauthorized("Malformed token subject"))
    }

    pub fn election_id(&self) -> Result<Option<Id>> {
        self.election
            .as_deref()
            .map(|id| id.parse())
            .transpose()
            .map_err(|_| Error::unauthorized("Malformed token election"))
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Claims {
    type Error = Error;

    /// Decode the claims of any valid bearer token.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let config = match req.guard::<&State<Config>>().await {
            Outcome::Success(config) => config,
            _ => {
                return Outcome::Failure((
                    Status::InternalServerError,
                    Error::internal("Config unavailable"),
                ))
            }
        };

        let token = match req
            .headers()
            .get_one("Authorization")
            .and_then(|header| header.strip_prefix(BEARER_PREFIX))
        {
            Some(token) => token.trim(),
            None => {
                return Outcome::Failure((
                    Status::Unauthorized,
                    Error::unauthorized("Missing bearer token"),
                ))
            }
        };

        match Self::decode(token, config) {
            Ok(claims) => Outcome::Success(claims),
            Err(e) => Outcome::Failure((Status::Unauthorized, e)),
        }
    }
}

/// A verified bearer token, whose principal still exists and may act as `U`.
pub struct AuthToken<U> {
    /// The account or voter ID.
    pub id: Id,
    /// For accounts, the role currently stored in the database.
    pub role: Role,
    election_id: Option<Id>,
    phantom: PhantomData<U>,
}

impl<U> AuthToken<U> {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl AuthToken<Voter> {
    /// The election this voter is registered on.
    pub fn election_id(&self) -> Result<Id> {
        self.election_id
            .ok_or_else(|| Error::unauthorized("Token is not scoped to an election"))
    }
}

impl<U> AuthToken<U>
where
    U: User,
{
    async fn verify(claims: Claims, db: &Database) -> std::result::Result<Self, (Status, Error)> {
        let unauthorized = |e: Error| (Status::Unauthorized, e);
        let id = claims.subject().map_err(unauthorized)?;

        let (role, election_id) = if claims.role == Role::Voter {
            let election_id = claims
                .election_id()
                .map_err(unauthorized)?
                .ok_or_else(|| unauthorized(Error::unauthorized("Voter token has no election")))?;
            // The voter must still be registered on the election.
            let filter = doc! {
                "_id": election_id,
                "voters.id": id,
            };
            let registered = Coll::<Election>::from_db(db)
                .count_documents(filter, None)
                .await
                .map_err(|e| (Status::InternalServerError, e.into()))?;
            if registered == 0 {
                return Err(unauthorized(Error::unauthorized("Voter is no longer registered")));
            }
            (Role::Voter, Some(election_id))
        } else {
            let account = Coll::<Account>::from_db(db)
                .find_one(id.as_doc(), None)
                .await
                .map_err(|e| (Status::InternalServerError, e.into()))?
                .ok_or_else(|| unauthorized(Error::unauthorized("Account no longer exists")))?;
            (account.role, None)
        };

        if !U::permits(role) {
            return Err((
                Status::Forbidden,
                Error::forbidden(format!("Not permitted for role {role}")),
            ));
        }

        Ok(Self {
            id,
            role,
            election_id,
            phantom: PhantomData,
        })
    }
}

#[rocket::async_trait]
impl<'r, U> FromRequest<'r> for AuthToken<U>
where
    U: User + Send,
{
    type Error = Error;

    /// Get an [`AuthToken`] from the bearer token and verify that its
    /// principal exists and has the rights of this user type.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let claims = try_outcome!(req.guard::<Claims>().await);

        let db = match req.rocket().state::<Database>() {
            Some(db) => db,
            None => {
                return Outcome::Failure((
                    Status::InternalServerError,
                    Error::internal("Database unavailable"),
                ))
            }
        };

        match Self::verify(claims, db).await {
            Ok(token) => Outcome::Success(token),
            Err(failure) => Outcome::Failure(failure),
        }
    }
}

/// A bearer token held by a test client.
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct Bearer(pub String);

#[cfg(test)]
impl Bearer {
    pub fn header(&self) -> rocket::http::Header<'static> {
        rocket::http::Header::new("Authorization", format!("{BEARER_PREFIX}{}", self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;

    use crate::model::{common::email::Email, db::user::NewUser};

    fn account() -> Account {
        Account {
            id: Id::new(),
            user: NewUser::example_organizer(),
        }
    }

    #[test]
    fn account_claims_round_trip() {
        let config = Config::example();
        let account = account();
        let claims = Claims::for_account(&account, &config);
        let token = claims.encode(&config).unwrap();

        let decoded = Claims::decode(&token, &config).unwrap();
        assert_eq!(decoded.subject().unwrap(), account.id);
        assert_eq!(decoded.role, Role::Organizer);
        assert_eq!(decoded.election_id().unwrap(), None);
        assert_eq!(decoded.expire_at.timestamp(), claims.expire_at.timestamp());
    }

    #[test]
    fn voter_claims_carry_election() {
        let config = Config::example();
        let election_id = Id::new();
        let voter = Voter::new(Email::example(), None);
        let claims = Claims::for_voter(election_id, &voter, &config);
        let token = claims.encode(&config).unwrap();

        let decoded = Claims::decode(&token, &config).unwrap();
        assert_eq!(decoded.role, Role::Voter);
        assert_eq!(decoded.subject().unwrap(), voter.id);
        assert_eq!(decoded.election_id().unwrap(), Some(election_id));
    }

    #[test]
    fn expired_tokens_are_unauthorized() {
        let config = Config::example();
        let mut claims = Claims::for_account(&account(), &config);
        claims.expire_at = Utc::now() - Duration::hours(1);
        let token = claims.encode(&config).unwrap();

        let err = Claims::decode(&token, &config).unwrap_err();
        assert_eq!(err.status(), Status::Unauthorized);
    }

    #[test]
    fn forged_tokens_are_unauthorized() {
        let config = Config::example();
        let claims = Claims::for_account(&account(), &config);
        let token = claims.encode(&config).unwrap();

        let mut tampered = token.clone();
        tampered.push('x');
        let err = Claims::decode(&tampered, &config).unwrap_err();
        assert_eq!(err.status(), Status::Unauthorized);
    }
}
