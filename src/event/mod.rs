//! Event system for device notifications.
//!
//! Decoded hardware activity and connection changes are fanned out to all
//! current subscribers over a broadcast channel. Emissions come from the
//! single frame-processing task, so subscribers observe them in delivery
//! order.

use tokio::sync::broadcast;

use crate::types::{Key, Knob, TouchContact, TouchKind};

/// Event types that can be dispatched.
#[derive(Debug, Clone)]
pub enum Event {
    /// Connection established and handshake completed.
    Connected,
    /// Connection lost. `error` is `None` for an explicit close.
    Disconnected {
        /// Cause of an unexpected disconnect.
        error: Option<String>,
    },
    /// A button or knob went down or up.
    Button {
        /// The control that changed.
        key: Key,
        /// True on press, false on release.
        pressed: bool,
    },
    /// A knob rotated.
    Rotate {
        /// The knob that turned.
        knob: Knob,
        /// Signed detent count, negative for counter-clockwise.
        delta: i8,
    },
    /// A touch contact started, moved, or ended.
    Touch {
        /// How the changed contact is classified.
        kind: TouchKind,
        /// All contacts currently on the glass, after this report.
        touches: Vec<TouchContact>,
        /// The contact this report was about.
        changed: TouchContact,
    },
}

/// A subscription to events.
pub struct Subscription {
    receiver: broadcast::Receiver<Event>,
}

impl Subscription {
    /// Receives the next event.
    ///
    /// Returns `None` once the dispatcher is gone. A slow subscriber that
    /// lags behind skips the missed events and keeps receiving.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Dispatches events to subscribers.
#[derive(Clone)]
pub struct EventDispatcher {
    sender: broadcast::Sender<Event>,
}

impl EventDispatcher {
    /// Creates a new event dispatcher with the given buffer capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Dispatches an event to all current subscribers.
    pub fn dispatch(&self, event: Event) {
        // No receivers is fine; the emission is simply dropped.
        let _ = self.sender.send(event);
    }

    /// Subscribes to all subsequent events.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Button;

    #[tokio::test]
    async fn test_event_dispatch() {
        let dispatcher = EventDispatcher::new(16);
        let mut sub = dispatcher.subscribe();

        dispatcher.dispatch(Event::Connected);

        let event = tokio::time::timeout(std::time::Duration::from_millis(100), sub.recv())
            .await
            .unwrap();
        assert!(matches!(event, Some(Event::Connected)));
    }

    #[tokio::test]
    async fn test_all_subscribers_receive_in_order() {
        let dispatcher = EventDispatcher::new(16);
        let mut first = dispatcher.subscribe();
        let mut second = dispatcher.subscribe();

        dispatcher.dispatch(Event::Button {
            key: Key::Button(Button::Home),
            pressed: true,
        });
        dispatcher.dispatch(Event::Button {
            key: Key::Button(Button::Home),
            pressed: false,
        });

        for sub in [&mut first, &mut second] {
            assert!(matches!(
                sub.recv().await,
                Some(Event::Button { pressed: true, .. })
            ));
            assert!(matches!(
                sub.recv().await,
                Some(Event::Button { pressed: false, .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_events() {
        let dispatcher = EventDispatcher::new(16);
        dispatcher.dispatch(Event::Connected);

        let mut sub = dispatcher.subscribe();
        dispatcher.dispatch(Event::Disconnected { error: None });

        assert!(matches!(
            sub.recv().await,
            Some(Event::Disconnected { error: None })
        ));
    }
}
