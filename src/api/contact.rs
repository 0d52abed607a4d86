use chrono::Utc;
use log::{info, warn};
use mongodb::{bson::doc, options::FindOptions};
use rocket::{futures::TryStreamExt, http::Status, serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    mail::{Mail, Mailer},
    model::{
        api::{
            auth::{Admin, AuthToken},
            contact::{ContactDescription, ContactRequest},
            pagination::{Paginated, Pagination},
        },
        common::email::Email,
        db::contact::{ContactMessage, NewContactMessage},
        mongodb::{Coll, Id},
    },
    Config,
};

/// Longest message accepted, in characters.
const MAX_MESSAGE_LENGTH: usize = 5000;

pub fn routes() -> Vec<Route> {
    routes![send_message, list_messages]
}

fn forward(message: &NewContactMessage, inbox: &str) -> Mail {
    let subject = if message.subject.is_empty() {
        "Contact form message".to_string()
    } else {
        format!("Contact form: {}", message.subject)
    };
    let text = format!(
        "From: {} <{}>\n\n{}\n",
        message.name, message.email, message.message
    );
    Mail::new(inbox, subject, text)
}

#[post("/contact", data = "<request>", format = "json")]
async fn send_message(
    request: Json<ContactRequest>,
    new_messages: Coll<NewContactMessage>,
    mailer: &State<Mailer>,
    config: &State<Config>,
) -> Result<(Status, Json<ContactDescription>)> {
    let request = request.0;
    let name = request.name.trim();
    if name.is_empty() {
        return Err(Error::bad_request("Name must not be empty"));
    }
    let email: Email = request
        .email
        .parse()
        .map_err(|e| Error::bad_request(format!("{e}")))?;
    let text = request.message.trim();
    if text.is_empty() {
        return Err(Error::bad_request("Message must not be empty"));
    }
    if text.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(Error::bad_request(format!(
            "Messages are limited to {MAX_MESSAGE_LENGTH} characters"
        )));
    }

    let message = NewContactMessage {
        name: name.to_string(),
        email,
        subject: request.subject.trim().to_string(),
        message: text.to_string(),
        received_at: Utc::now(),
    };
    let message_id: Id = new_messages
        .insert_one(&message, None)
        .await?
        .inserted_id
        .as_object_id()
        .ok_or_else(|| Error::internal("Inserted contact message has no ObjectId"))?
        .into();
    info!("Received contact message {message_id} from {}", message.email);

    if let Some(inbox) = config.contact_inbox() {
        if let Err(e) = mailer.send(forward(&message, inbox)).await {
            warn!("Failed to forward contact message {message_id}: {e}");
        }
    }

    let message = ContactMessage {
        id: message_id,
        message,
    };
    Ok((Status::Created, Json(message.into())))
}

#[get("/contact")]
async fn list_messages(
    _token: AuthToken<Admin>,
    pagination: Pagination,
    messages: Coll<ContactMessage>,
) -> Result<Json<Paginated<ContactDescription>>> {
    let total = messages.count_documents(None, None).await?;
    let options = FindOptions::builder()
        .sort(doc! { "received_at": -1, "_id": -1 })
        .skip(pagination.skip())
        .limit(pagination.limit())
        .build();
    let page: Vec<ContactDescription> = messages
        .find(None, options)
        .await?
        .map_ok(ContactDescription::from)
        .try_collect()
        .await?;
    Ok(Json(pagination.page(page, total)))
}
