use std::time::Duration;

use log::{error, info};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Serialize;

use crate::{error::Result, Config};

const RELAY_TIMEOUT: Duration = Duration::from_secs(10);

/// A plain-text e-mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub text: String,
}

impl Mail {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            text: text.into(),
        }
    }
}

/// The body expected by the mail relay.
#[derive(Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

/// Sends mail through an HTTP relay.
///
/// Without a configured relay, mail is logged and dropped.
pub struct Mailer {
    http_client: reqwest::Client,
    endpoint: Option<String>,
    api_key: Option<String>,
    from: String,
    #[cfg(test)]
    outbox: std::sync::Mutex<Vec<Mail>>,
}

impl Mailer {
    pub fn new(config: &Config) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(RELAY_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http_client,
            endpoint: config.mail_endpoint().map(str::to_string),
            api_key: config.mail_api_key().map(str::to_string),
            from: config.mail_from().to_string(),
            #[cfg(test)]
            outbox: Default::default(),
        }
    }

    pub async fn send(&self, mail: Mail) -> Result<()> {
        #[cfg(test)]
        self.outbox.lock().unwrap().push(mail.clone());

        let endpoint = match &self.endpoint {
            Some(endpoint) => endpoint,
            None => {
                info!("{}", dropped_notice(&mail));
                return Ok(());
            }
        };

        let message = RelayMessage {
            from: &self.from,
            to: &mail.to,
            subject: &mail.subject,
            text: &mail.text,
        };
        let mut request = self.http_client.post(endpoint).json(&message);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }
        request.send().await?.error_for_status()?;
        info!("Sent '{}' to {}", mail.subject, mail.to);
        Ok(())
    }

    /// Every mail sent so far.
    #[cfg(test)]
    pub fn sent(&self) -> Vec<Mail> {
        self.outbox.lock().unwrap().clone()
    }
}

/// The log line for a mail dropped for want of a relay. Bodies carry access
/// keys and reset links and are never logged.
fn dropped_notice(mail: &Mail) -> String {
    format!(
        "Mail delivery disabled, dropping '{}' to {}",
        mail.subject, mail.to
    )
}

/// A fairing that builds a [`Mailer`] from the application config and places
/// it into managed state. Must be attached after [`crate::config::ConfigFairing`].
pub struct MailerFairing;

#[rocket::async_trait]
impl Fairing for MailerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Mailer",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let mailer = match rocket.state::<Config>() {
            Some(config) => Mailer::new(config),
            None => {
                error!("Application config was not available when building the mailer");
                return Err(rocket);
            }
        };
        match &mailer.endpoint {
            Some(endpoint) => info!("Mail will be relayed through {endpoint}"),
            None => info!("No mail relay configured, mail will be logged only"),
        }

        rocket = rocket.manage(mailer);
        Ok(rocket)
    }
}
