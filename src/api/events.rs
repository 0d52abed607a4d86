use log::debug;
use rocket::{
    response::stream::{Event, EventStream},
    tokio::{select, sync::broadcast::error::RecvError},
    Route, Shutdown, State,
};

use crate::events::ElectionEvents;

pub fn routes() -> Vec<Route> {
    routes![election_events]
}

/// Stream a named event, without data, whenever elections change.
#[get("/events")]
fn election_events(events: &State<ElectionEvents>, mut shutdown: Shutdown) -> EventStream![] {
    let mut receiver = events.subscribe();
    EventStream! {
        loop {
            let event = select! {
                received = receiver.recv() => match received {
                    Ok(event) => event,
                    Err(RecvError::Closed) => break,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Event subscriber skipped {skipped} events");
                        continue;
                    }
                },
                _ = &mut shutdown => break,
            };
            yield Event::empty().event(event.name());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::serde_json::json,
        tokio::{io::AsyncReadExt, time::timeout},
    };

    use crate::model::api::{auth::Bearer, election::ElectionSpec};

    use super::*;

    #[backend_test(organizer)]
    async fn election_changes_are_streamed(client: Client, bearer: Bearer) {
        let mut response = client.get(uri!("/api", election_events)).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.content_type(), Some(ContentType::EventStream));

        let created = client
            .post("/api/elections")
            .header(bearer.header())
            .header(ContentType::JSON)
            .body(json!(ElectionSpec::future_example()).to_string())
            .dispatch()
            .await;
        assert_eq!(created.status(), Status::Created);

        // Heartbeat comments may arrive first.
        let mut received = String::new();
        let mut buffer = [0; 256];
        while !received.contains("elections-changed") {
            let read = timeout(Duration::from_secs(5), response.read(&mut buffer))
                .await
                .expect("no event within 5 seconds")
                .unwrap();
            assert!(read > 0, "stream ended early");
            received.push_str(&String::from_utf8_lossy(&buffer[..read]));
        }
        assert!(received.contains("event:"), "got {received:?}");
    }
}
