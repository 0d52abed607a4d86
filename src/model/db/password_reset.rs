use std::ops::Deref;

use chrono::{DateTime, Utc};
use data_encoding::{BASE64URL_NOPAD, HEXLOWER};
use hmac::Mac;
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::{
    model::{common::access_key::HmacSha256, mongodb::Id},
    Config,
};

/// Number of random bytes in a reset token.
pub const TOKEN_BYTES: usize = 32;

/// The keyed hash under which a reset token is stored.
/// The token itself only ever exists in the e-mail sent to the user.
pub fn token_hmac(token: &str, config: &Config) -> String {
    let mut mac =
        HmacSha256::new_from_slice(config.hmac_secret()).expect("HMAC can take key of any size");
    mac.update(b"password-reset:");
    mac.update(token.as_bytes());
    HEXLOWER.encode(&mac.finalize().into_bytes())
}

/// An outstanding password reset request, as stored in the database.
/// Expired documents are removed by a TTL index on `expire_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordResetCore {
    pub user_id: Id,
    pub token_hmac: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub expire_at: DateTime<Utc>,
}

impl PasswordResetCore {
    /// Create a reset request for the given user, returning it with its plaintext token.
    pub fn new(user_id: Id, config: &Config) -> (Self, String) {
        let mut bytes = [0_u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = BASE64URL_NOPAD.encode(&bytes);
        let reset = Self {
            user_id,
            token_hmac: token_hmac(&token, config),
            expire_at: Utc::now() + config.reset_ttl(),
        };
        (reset, token)
    }

    /// Has the token expired? The TTL monitor only runs periodically, so
    /// expired documents can still be found for a short while.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expire_at
    }
}

/// A reset request without an ID.
pub type NewPasswordReset = PasswordResetCore;

/// A reset request from the database, with its unique ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordReset {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub reset: PasswordResetCore,
}

impl Deref for PasswordReset {
    type Target = PasswordResetCore;

    fn deref(&self) -> &Self::Target {
        &self.reset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;

    #[test]
    fn tokens_are_unique_and_hashed() {
        let config = Config::example();
        let user = Id::new();
        let (first, first_token) = NewPasswordReset::new(user, &config);
        let (second, second_token) = NewPasswordReset::new(user, &config);

        assert_ne!(first_token, second_token);
        assert_ne!(first.token_hmac, second.token_hmac);
        assert_ne!(first.token_hmac, first_token);
        assert_eq!(first.token_hmac, token_hmac(&first_token, &config));
    }

    #[test]
    fn expiry_follows_config() {
        let config = Config::example();
        let (reset, _) = NewPasswordReset::new(Id::new(), &config);
        let now = Utc::now();
        assert!(!reset.is_expired(now));
        assert!(reset.is_expired(now + config.reset_ttl() + Duration::seconds(1)));
    }
}
