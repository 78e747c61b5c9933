// Notifications for subscribed clients

use tokio::sync::broadcast;

/// Change notification delivered to every subscriber in send order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The chain tip moved; carries the new tip height
    NewHeight(u32),
    /// Coins of this address changed
    TouchedAddress(String),
}

/// Fan-out of [`Event`]s.
///
/// Subscribers that fall more than `capacity` events behind get
/// `RecvError::Lagged` and skip ahead; the sender never waits for them.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: Event) {
        log::trace!("emit {:?}", event);
        // Err only means nobody is subscribed
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
