use log::info;
use mongodb::{
    bson::doc,
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument},
};
use rocket::{futures::TryStreamExt, http::Status, serde::json::Json, Route, State};

use crate::{
    api::common::token_account,
    error::{Error, Result},
    model::{
        api::{
            auth::{Admin, AuthResponse, AuthToken, Claims, LoginRequest, RegisterRequest, Role},
            pagination::{Paginated, Pagination},
            user::{PasswordChange, ProfileUpdate, RoleUpdate, UserDescription},
        },
        common::email::Email,
        db::{
            password_reset::PasswordReset,
            user::{hash_password, NewUser, User, MIN_PASSWORD_LENGTH},
        },
        mongodb::{is_duplicate_key_error, Coll, Id},
    },
    Config,
};

pub fn routes() -> Vec<Route> {
    routes![
        register,
        login,
        get_me,
        update_me,
        change_password,
        list_users,
        set_role,
        delete_user,
    ]
}

fn check_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(Error::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

fn parse_email(email: &str) -> Result<Email> {
    email.parse().map_err(|e| Error::bad_request(format!("{e}")))
}

fn auth_response(user: User, config: &Config) -> Result<AuthResponse> {
    let token = Claims::for_account(&user, config).encode(config)?;
    Ok(AuthResponse {
        token,
        user: user.into(),
    })
}

#[post("/users/register", data = "<request>", format = "json")]
async fn register(
    request: Json<RegisterRequest>,
    new_users: Coll<NewUser>,
    users: Coll<User>,
    config: &State<Config>,
) -> Result<(Status, Json<AuthResponse>)> {
    let request = request.0;
    let name = request.name.trim();
    if name.is_empty() {
        return Err(Error::bad_request("Name must not be empty"));
    }
    let email = parse_email(&request.email)?;
    check_password(&request.password)?;

    let user = NewUser::new(name.to_string(), email, &request.password, Role::Organizer)?;
    let result = new_users.insert_one(&user, None).await;
    if is_duplicate_key_error(result.as_ref()) {
        return Err(Error::conflict(format!(
            "An account already exists for {}",
            user.email
        )));
    }
    let user_id: Id = result?
        .inserted_id
        .as_object_id()
        .ok_or_else(|| Error::internal("Inserted user has no ObjectId"))?
        .into();

    let user = users
        .find_one(user_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("User {user_id}")))?;
    info!("Registered organizer {}", user.email);
    Ok((Status::Created, Json(auth_response(user, config)?)))
}

#[post("/users/login", data = "<credentials>", format = "json")]
async fn login(
    credentials: Json<LoginRequest>,
    users: Coll<User>,
    config: &State<Config>,
) -> Result<Json<AuthResponse>> {
    let no_match = || Error::unauthorized("No account matches that e-mail and password");

    let email: Email = credentials.email.parse().map_err(|_| no_match())?;
    let user = users
        .find_one(doc! { "email": &email }, None)
        .await?
        .filter(|user| user.verify_password(&credentials.password))
        .ok_or_else(no_match)?;

    Ok(Json(auth_response(user, config)?))
}

#[get("/users/me")]
async fn get_me(token: AuthToken<User>, users: Coll<User>) -> Result<Json<UserDescription>> {
    let user = token_account(&token, &users).await?;
    Ok(Json(user.into()))
}

#[put("/users/me", data = "<update>", format = "json")]
async fn update_me(
    token: AuthToken<User>,
    update: Json<ProfileUpdate>,
    users: Coll<User>,
) -> Result<Json<UserDescription>> {
    let mut changes = doc! {};
    if let Some(name) = &update.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::bad_request("Name must not be empty"));
        }
        changes.insert("name", name);
    }
    if let Some(email) = &update.email {
        changes.insert("email", parse_email(email)?);
    }
    if changes.is_empty() {
        return get_me(token, users).await;
    }

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();
    let result = users
        .find_one_and_update(token.id.as_doc(), doc! { "$set": changes }, options)
        .await;
    if is_duplicate_key_error(result.as_ref()) {
        return Err(Error::conflict("That e-mail is already in use"));
    }
    let user = result?.ok_or_else(|| Error::not_found(format!("User {}", token.id)))?;
    Ok(Json(user.into()))
}

#[put("/users/me/password", data = "<change>", format = "json")]
async fn change_password(
    token: AuthToken<User>,
    change: Json<PasswordChange>,
    users: Coll<User>,
) -> Result<()> {
    let user = token_account(&token, &users).await?;
    if !user.verify_password(&change.current_password) {
        return Err(Error::forbidden("Current password is incorrect"));
    }
    check_password(&change.new_password)?;

    let update = doc! {
        "$set": { "password_hash": hash_password(&change.new_password)? }
    };
    users.update_one(user.id.as_doc(), update, None).await?;
    info!("User {} changed their password", user.id);
    Ok(())
}

#[get("/users")]
async fn list_users(
    _token: AuthToken<Admin>,
    pagination: Pagination,
    users: Coll<User>,
) -> Result<Json<Paginated<UserDescription>>> {
    let total = users.count_documents(None, None).await?;
    let options = FindOptions::builder()
        .sort(doc! { "created_at": 1 })
        .skip(pagination.skip())
        .limit(pagination.limit())
        .build();
    let page: Vec<UserDescription> = users
        .find(None, options)
        .await?
        .map_ok(UserDescription::from)
        .try_collect()
        .await?;
    Ok(Json(pagination.page(page, total)))
}

/// Refuse to remove the given user's admin rights if nobody else has them.
async fn ensure_not_last_admin(user: &User, users: &Coll<User>) -> Result<()> {
    if user.role != Role::Admin {
        return Ok(());
    }
    let admins = users
        .count_documents(doc! { "role": Role::Admin }, None)
        .await?;
    if admins <= 1 {
        return Err(Error::conflict("Cannot remove the last admin"));
    }
    Ok(())
}

#[put("/users/<user_id>/role", data = "<update>", format = "json")]
async fn set_role(
    _token: AuthToken<Admin>,
    user_id: Id,
    update: Json<RoleUpdate>,
    users: Coll<User>,
) -> Result<Json<UserDescription>> {
    if update.role == Role::Voter {
        return Err(Error::bad_request("Accounts must be admins or organizers"));
    }
    let user = users
        .find_one(user_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("User {user_id}")))?;
    if update.role != Role::Admin {
        ensure_not_last_admin(&user, &users).await?;
    }

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();
    let user = users
        .find_one_and_update(
            user_id.as_doc(),
            doc! { "$set": { "role": update.role } },
            options,
        )
        .await?
        .ok_or_else(|| Error::not_found(format!("User {user_id}")))?;
    info!("User {user_id} is now {}", update.role);
    Ok(Json(user.into()))
}

#[delete("/users/<user_id>")]
async fn delete_user(
    _token: AuthToken<Admin>,
    user_id: Id,
    users: Coll<User>,
    resets: Coll<PasswordReset>,
) -> Result<()> {
    let user = users
        .find_one(user_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("User {user_id}")))?;
    ensure_not_last_admin(&user, &users).await?;

    resets
        .delete_many(doc! { "user_id": user_id }, None)
        .await?;
    users.delete_one(user_id.as_doc(), None).await?;
    info!("Deleted user {user_id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use mongodb::Database;
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::serde_json::json,
    };

    use crate::model::api::auth::Bearer;

    use super::*;

    async fn register_example(client: &Client) -> AuthResponse {
        let response = client
            .post(uri!("/api", register))
            .header(ContentType::JSON)
            .body(json!(RegisterRequest::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);
        response.into_json().await.unwrap()
    }

    #[backend_test]
    async fn register_then_login(client: Client) {
        let registered = register_example(&client).await;
        assert_eq!(registered.user.email, "rita@example.com");
        assert_eq!(registered.user.role, Role::Organizer);

        let credentials = LoginRequest {
            email: "RITA@example.com".to_string(),
            password: RegisterRequest::example().password,
        };
        let response = client
            .post(uri!("/api", login))
            .header(ContentType::JSON)
            .body(json!(credentials).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let logged_in: AuthResponse = response.into_json().await.unwrap();
        assert_eq!(logged_in.user, registered.user);

        // The token works.
        let response = client
            .get(uri!("/api", get_me))
            .header(Bearer(logged_in.token).header())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let me: UserDescription = response.into_json().await.unwrap();
        assert_eq!(me.id, registered.user.id);
    }

    #[backend_test]
    async fn duplicate_registration_conflicts(client: Client, db: Database) {
        register_example(&client).await;
        let response = client
            .post(uri!("/api", register))
            .header(ContentType::JSON)
            .body(json!(RegisterRequest::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Conflict);

        let count = Coll::<User>::from_db(&db)
            .count_documents(None, None)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[backend_test]
    async fn registration_is_validated(client: Client) {
        let bad_requests = [
            json!({ "name": "", "email": "a@example.com", "password": "long enough" }),
            json!({ "name": "A", "email": "not-an-email", "password": "long enough" }),
            json!({ "name": "A", "email": "a@example.com", "password": "short" }),
        ];
        for body in bad_requests {
            let response = client
                .post(uri!("/api", register))
                .header(ContentType::JSON)
                .body(body.to_string())
                .dispatch()
                .await;
            assert_eq!(response.status(), Status::BadRequest, "{body}");
        }
    }

    #[backend_test(organizer)]
    async fn wrong_password_is_unauthorized(client: Client) {
        let mut credentials = LoginRequest::example_organizer();
        credentials.password.push('!');
        let response = client
            .post(uri!("/api", login))
            .header(ContentType::JSON)
            .body(json!(credentials).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);

        let credentials = LoginRequest {
            email: "nobody@example.com".to_string(),
            password: "whatever it is".to_string(),
        };
        let response = client
            .post(uri!("/api", login))
            .header(ContentType::JSON)
            .body(json!(credentials).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[backend_test(organizer)]
    async fn update_profile_and_password(client: Client, bearer: Bearer) {
        let response = client
            .put(uri!("/api", update_me))
            .header(bearer.header())
            .header(ContentType::JSON)
            .body(json!({ "name": "Oscar O." }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let me: UserDescription = response.into_json().await.unwrap();
        assert_eq!(me.name, "Oscar O.");
        assert_eq!(me.email, LoginRequest::example_organizer().email);

        // Wrong current password.
        let change = PasswordChange {
            current_password: "not my password".to_string(),
            new_password: "a brand new password".to_string(),
        };
        let response = client
            .put(uri!("/api", change_password))
            .header(bearer.header())
            .header(ContentType::JSON)
            .body(json!(change).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        let change = PasswordChange {
            current_password: LoginRequest::example_organizer().password,
            new_password: "a brand new password".to_string(),
        };
        let response = client
            .put(uri!("/api", change_password))
            .header(bearer.header())
            .header(ContentType::JSON)
            .body(json!(change).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let credentials = LoginRequest {
            email: LoginRequest::example_organizer().email,
            password: "a brand new password".to_string(),
        };
        let response = client
            .post(uri!("/api", login))
            .header(ContentType::JSON)
            .body(json!(credentials).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
    }

    #[backend_test(organizer)]
    async fn organizers_cannot_administer(client: Client, bearer: Bearer) {
        let response = client
            .get("/api/users")
            .header(bearer.header())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);
    }

    #[backend_test(admin)]
    async fn admin_manages_roles(client: Client, bearer: Bearer, new_users: Coll<NewUser>) {
        let organizer_id: Id = new_users
            .insert_one(NewUser::example_organizer(), None)
            .await
            .unwrap()
            .inserted_id
            .as_object_id()
            .unwrap()
            .into();

        let response = client
            .get("/api/users?page_num=1&page_size=10")
            .header(bearer.header())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let page: Paginated<UserDescription> = response.into_json().await.unwrap();
        assert_eq!(page.pagination.total, 2);
        assert_eq!(page.items.len(), 2);

        // Promote the organizer, then demote the original admin.
        let response = client
            .put(uri!("/api", set_role(organizer_id)))
            .header(bearer.header())
            .header(ContentType::JSON)
            .body(json!(RoleUpdate { role: Role::Admin }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let promoted: UserDescription = response.into_json().await.unwrap();
        assert_eq!(promoted.role, Role::Admin);

        let admin_id: Id = page
            .items
            .iter()
            .find(|user| user.email == LoginRequest::example_admin().email)
            .unwrap()
            .id
            .parse()
            .unwrap();
        let response = client
            .put(uri!("/api", set_role(admin_id)))
            .header(bearer.header())
            .header(ContentType::JSON)
            .body(json!(RoleUpdate { role: Role::Organizer }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        // The old admin's token no longer grants admin rights.
        let response = client
            .get("/api/users")
            .header(bearer.header())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);
    }

    #[backend_test(admin)]
    async fn last_admin_is_protected(client: Client, bearer: Bearer, users: Coll<User>) {
        let admin = users.find_one(None, None).await.unwrap().unwrap();

        let response = client
            .put(uri!("/api", set_role(admin.id)))
            .header(bearer.header())
            .header(ContentType::JSON)
            .body(json!(RoleUpdate { role: Role::Organizer }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Conflict);

        let response = client
            .delete(uri!("/api", delete_user(admin.id)))
            .header(bearer.header())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Conflict);
        assert_eq!(users.count_documents(None, None).await.unwrap(), 1);
    }

    #[backend_test(admin)]
    async fn delete_user_revokes_access(client: Client, bearer: Bearer, users: Coll<User>) {
        let organizer = register_example(&client).await;
        let organizer_id: Id = organizer.user.id.parse().unwrap();

        let response = client
            .delete(uri!("/api", delete_user(organizer_id)))
            .header(bearer.header())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(users.count_documents(None, None).await.unwrap(), 1);

        let response = client
            .get(uri!("/api", get_me))
            .header(Bearer(organizer.token).header())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);

        let response = client
            .delete(uri!("/api", delete_user(organizer_id)))
            .header(bearer.header())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
    }
}
