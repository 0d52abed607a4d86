use rocket::{
    http::Status,
    response::status::Custom,
    serde::json::Json,
    Catcher, Request, Route,
};

use crate::error::ErrorBody;

mod common;
mod contact;
mod elections;
mod events;
mod password_reset;
mod reviews;
mod users;
mod votes;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(users::routes());
    routes.extend(elections::routes());
    routes.extend(votes::routes());
    routes.extend(reviews::routes());
    routes.extend(password_reset::routes());
    routes.extend(contact::routes());
    routes.extend(events::routes());
    routes
}

pub fn catchers() -> Vec<Catcher> {
    catchers![unauthorized, forbidden, not_found, default_catcher]
}

#[catch(401)]
fn unauthorized() -> Custom<Json<ErrorBody>> {
    Custom(
        Status::Unauthorized,
        Json(ErrorBody::new("Missing, invalid or expired bearer token")),
    )
}

#[catch(403)]
fn forbidden() -> Custom<Json<ErrorBody>> {
    Custom(
        Status::Forbidden,
        Json(ErrorBody::new("Not permitted for this account")),
    )
}

#[catch(404)]
fn not_found(req: &Request) -> Custom<Json<ErrorBody>> {
    Custom(
        Status::NotFound,
        Json(ErrorBody::new(format!("No route for {}", req.uri()))),
    )
}

#[catch(default)]
fn default_catcher(status: Status, _req: &Request) -> Custom<Json<ErrorBody>> {
    Custom(status, Json(ErrorBody::new(status.reason_lossy())))
}
