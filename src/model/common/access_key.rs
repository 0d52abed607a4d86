//! Voter access keys.
//!
//! A key is never stored. It is the truncated HMAC of the election ID and the
//! voter's e-mail, so it can be recomputed whenever it is needed and is
//! useless for any other election.

use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::model::{common::email::Email, mongodb::Id};

pub type HmacSha256 = Hmac<Sha256>;

/// Number of HMAC bytes kept in a key, giving 16 base32 characters.
pub const ACCESS_KEY_BYTES: usize = 10;

fn keyed_mac(secret: &[u8], election_id: Id, email: &Email) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(election_id.to_string().as_bytes());
    mac.update(b":");
    mac.update(email.as_bytes());
    mac
}

/// Derive the access key of a voter for an election.
pub fn derive_access_key(secret: &[u8], election_id: Id, email: &Email) -> String {
    let tag = keyed_mac(secret, election_id, email).finalize().into_bytes();
    BASE32_NOPAD.encode(&tag[..ACCESS_KEY_BYTES])
}

/// Check a key supplied by a voter, in constant time.
///
/// Case, whitespace and dashes are ignored so keys can be typed in groups.
pub fn verify_access_key(secret: &[u8], election_id: Id, email: &Email, key: &str) -> bool {
    let cleaned: String = key
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect();
    let bytes = match BASE32_NOPAD.decode(cleaned.as_bytes()) {
        Ok(bytes) if bytes.len() == ACCESS_KEY_BYTES => bytes,
        _ => return false,
    };
    keyed_mac(secret, election_id, email)
        .verify_truncated_left(&bytes)
        .is_ok()
}
