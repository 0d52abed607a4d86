use log::trace;
use rocket::tokio::sync::broadcast::{self, Receiver, Sender};

/// How many undelivered events a slow subscriber may fall behind by before
/// it starts skipping.
const CHANNEL_CAPACITY: usize = 64;

/// Something connected clients should react to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ElectionEvent {
    /// The set of elections, or the status of one of them, changed.
    ElectionsChanged,
}

impl ElectionEvent {
    /// The server-sent event name.
    pub fn name(self) -> &'static str {
        match self {
            Self::ElectionsChanged => "elections-changed",
        }
    }
}

/// A broadcast channel of [`ElectionEvent`]s, kept in managed state.
///
/// Delivery is best-effort: events sent while nobody is subscribed are
/// dropped, and lagging subscribers skip what they missed.
#[derive(Debug, Clone)]
pub struct ElectionEvents {
    sender: Sender<ElectionEvent>,
}

impl ElectionEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> Receiver<ElectionEvent> {
        self.sender.subscribe()
    }

    /// Tell every subscriber the election list changed.
    pub fn elections_changed(&self) {
        let receivers = self.sender.send(ElectionEvent::ElectionsChanged).unwrap_or(0);
        trace!("Broadcast elections-changed to {receivers} subscribers");
    }
}

impl Default for ElectionEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rocket::async_test]
    async fn subscribers_receive_events() {
        let events = ElectionEvents::new();
        let mut first = events.subscribe();
        let mut second = events.clone().subscribe();

        events.elections_changed();

        assert_eq!(first.recv().await.unwrap(), ElectionEvent::ElectionsChanged);
        assert_eq!(second.recv().await.unwrap(), ElectionEvent::ElectionsChanged);
    }

    #[test]
    fn sending_without_subscribers_is_harmless() {
        let events = ElectionEvents::new();
        events.elections_changed();
        let mut late = events.subscribe();
        assert!(late.try_recv().is_err());
    }

    #[test]
    fn event_names() {
        assert_eq!(ElectionEvent::ElectionsChanged.name(), "elections-changed");
    }
}
