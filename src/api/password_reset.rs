use chrono::Utc;
use log::{debug, info, warn};
use mongodb::bson::doc;
use rocket::{serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    mail::{Mail, Mailer},
    model::{
        api::password_reset::{ResetConfirmation, ResetRequest},
        common::email::Email,
        db::{
            password_reset::{token_hmac, NewPasswordReset, PasswordReset},
            user::{hash_password, User, MIN_PASSWORD_LENGTH},
        },
        mongodb::Coll,
    },
    Config,
};

pub fn routes() -> Vec<Route> {
    routes![request_reset, verify_reset, confirm_reset]
}

/// Find the outstanding, unexpired reset request behind a token.
async fn find_reset(
    token: &str,
    password_resets: &Coll<PasswordReset>,
    config: &Config,
) -> Result<Option<PasswordReset>> {
    let filter = doc! { "token_hmac": token_hmac(token, config) };
    let reset = password_resets
        .find_one(filter, None)
        .await?
        .filter(|reset| !reset.is_expired(Utc::now()));
    Ok(reset)
}

fn reset_mail(user: &User, token: &str, config: &Config) -> Mail {
    let minutes = config.reset_ttl().num_minutes();
    let text = format!(
        "Hello {name},\n\n\
         Someone asked to reset the password of your account. If it was you, \
         follow this link within {minutes} minutes:\n\n\
         {frontend}/reset-password/{token}\n\n\
         If it was not you, you can ignore this e-mail.\n",
        name = user.name,
        frontend = config.frontend_url(),
    );
    Mail::new(user.email.to_string(), "Reset your password", text)
}

/// Start a password reset. The response never reveals whether an account exists.
#[post("/password-reset/request", data = "<request>", format = "json")]
async fn request_reset(
    request: Json<ResetRequest>,
    users: Coll<User>,
    password_resets: Coll<PasswordReset>,
    new_password_resets: Coll<NewPasswordReset>,
    mailer: &State<Mailer>,
    config: &State<Config>,
) -> Result<()> {
    let email: Email = match request.email.parse() {
        Ok(email) => email,
        Err(_) => {
            debug!("Ignoring password reset for a malformed e-mail");
            return Ok(());
        }
    };
    let user = match users.find_one(doc! { "email": &email }, None).await? {
        Some(user) => user,
        None => {
            debug!("Ignoring password reset for unknown e-mail {email}");
            return Ok(());
        }
    };

    password_resets
        .delete_many(doc! { "user_id": user.id }, None)
        .await?;
    let (reset, token) = NewPasswordReset::new(user.id, config);
    new_password_resets.insert_one(&reset, None).await?;
    info!("Issued a password reset for user {}", user.id);

    if let Err(e) = mailer.send(reset_mail(&user, &token, config)).await {
        warn!("Failed to mail password reset to user {}: {e}", user.id);
    }
    Ok(())
}

#[get("/password-reset/verify/<token>")]
async fn verify_reset(
    token: &str,
    password_resets: Coll<PasswordReset>,
    config: &State<Config>,
) -> Result<()> {
    find_reset(token, &password_resets, config)
        .await?
        .map(|_| ())
        .ok_or_else(|| Error::not_found("Password reset token"))
}

#[post("/password-reset/confirm", data = "<confirmation>", format = "json")]
async fn confirm_reset(
    confirmation: Json<ResetConfirmation>,
    users: Coll<User>,
    password_resets: Coll<PasswordReset>,
    config: &State<Config>,
) -> Result<()> {
    let invalid = || Error::bad_request("Password reset token is invalid or has expired");

    let reset = find_reset(&confirmation.token, &password_resets, config)
        .await?
        .ok_or_else(invalid)?;
    if confirmation.password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(Error::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    let update = doc! {
        "$set": { "password_hash": hash_password(&confirmation.password)? }
    };
    let result = users
        .update_one(reset.user_id.as_doc(), update, None)
        .await?;
    password_resets
        .delete_many(doc! { "user_id": reset.user_id }, None)
        .await?;
    if result.matched_count == 0 {
        return Err(invalid());
    }
    info!("User {} reset their password", reset.user_id);
    Ok(())
}
