use tokio::sync::broadcast;
use tracing::debug;

use crate::models::BookingConfirmation;

pub type BookingEventReceiver = broadcast::Receiver<BookingEvent>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingEvent {
    /// A booking was accepted; appointment lists should refresh.
    Succeeded(BookingConfirmation),
}

/// Fan-out of booking events to dashboard subscribers.
#[derive(Debug, Clone)]
pub struct BookingNotifier {
    sender: broadcast::Sender<BookingEvent>,
}

impl BookingNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> BookingEventReceiver {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Returns how many subscribers received the event. Zero subscribers is fine.
    pub fn notify_booking_succeeded(&self, confirmation: BookingConfirmation) -> usize {
        let appointment_id = confirmation.id;
        match self.sender.send(BookingEvent::Succeeded(confirmation)) {
            Ok(delivered) => {
                debug!("Booking {} announced to {} subscribers", appointment_id, delivered);
                delivered
            }
            Err(_) => {
                debug!("Booking {} confirmed with no subscribers listening", appointment_id);
                0
            }
        }
    }
}

impl Default for BookingNotifier {
    fn default() -> Self {
        Self::new(16)
    }
}
