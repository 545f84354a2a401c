//! Notification Types
//!
//! The session and its result buffer publish what happened to them through
//! typed channels. A presentation layer subscribes to these instead of
//! reaching into engine state.
//!
//! Emission is synchronous: `emit` calls every listener, in subscription
//! order, before returning.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::mpsc;

/// Lifecycle and log notifications from a connection session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// A connection was opened.
    Connected {
        /// The normalized target that was opened
        target: String,
    },

    /// The session is now disconnected. Fires on every disconnect,
    /// including the implicit one at the start of `connect`.
    Disconnected,

    /// Human-readable activity line.
    Log {
        /// The message text
        message: String,
    },
}

/// Change notifications from the paged result buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BufferEvent {
    /// Contents were replaced wholesale.
    Reset {
        /// Column headers after the reset
        columns: Vec<String>,
        /// Rows held after the reset
        rows: usize,
    },

    /// Rows were appended at the end.
    RowsAppended {
        /// Index of the first appended row
        first: usize,
        /// Number of rows appended
        count: usize,
    },

    /// Whether another fetch could yield rows.
    MoreAvailable {
        /// True iff the last batch came back full
        more: bool,
    },
}

/// Handle returned by [`Notifier::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Listener<E> = Box<dyn FnMut(&E) + Send>;

/// Listener registry for one event type.
pub struct Notifier<E> {
    listeners: Vec<(SubscriptionId, Listener<E>)>,
    next_id: u64,
}

impl<E> Notifier<E> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 0,
        }
    }

    /// Register a listener. It sees every event emitted from now on.
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&E) + Send + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns false if the id was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    pub fn emit(&mut self, event: E) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(&event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: Clone + Send + 'static> Notifier<E> {
    /// Subscribe a channel and return its receiving end.
    ///
    /// Events sent after the receiver is dropped are discarded.
    pub fn channel(&mut self) -> mpsc::Receiver<E> {
        let (tx, rx) = mpsc::channel();
        self.subscribe(move |event: &E| {
            let _ = tx.send(event.clone());
        });
        rx
    }
}

impl<E> Default for Notifier<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Notifier<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_emit_reaches_listeners_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut notifier = Notifier::new();

        let first = Arc::clone(&seen);
        notifier.subscribe(move |e: &SessionEvent| first.lock().unwrap().push(("a", e.clone())));
        let second = Arc::clone(&seen);
        notifier.subscribe(move |e: &SessionEvent| second.lock().unwrap().push(("b", e.clone())));

        notifier.emit(SessionEvent::Disconnected);

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                ("a", SessionEvent::Disconnected),
                ("b", SessionEvent::Disconnected)
            ]
        );
    }

    #[test]
    fn test_unsubscribe() {
        let mut notifier: Notifier<BufferEvent> = Notifier::new();
        let id = notifier.subscribe(|_| {});
        assert_eq!(notifier.listener_count(), 1);
        assert!(notifier.unsubscribe(id));
        assert!(!notifier.unsubscribe(id));
        assert_eq!(notifier.listener_count(), 0);
    }

    #[test]
    fn test_channel_receives_events() {
        let mut notifier = Notifier::new();
        let rx = notifier.channel();
        notifier.emit(BufferEvent::MoreAvailable { more: true });
        notifier.emit(BufferEvent::MoreAvailable { more: false });
        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            received,
            vec![
                BufferEvent::MoreAvailable { more: true },
                BufferEvent::MoreAvailable { more: false }
            ]
        );
    }

    #[test]
    fn test_dropped_channel_does_not_break_emit() {
        let mut notifier = Notifier::new();
        drop(notifier.channel());
        notifier.emit(SessionEvent::Log {
            message: "Committed".to_string(),
        });
    }

    #[test]
    fn test_session_event_serde_tag() {
        let json = serde_json::to_string(&SessionEvent::Connected {
            target: ":memory:".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"Connected","target":":memory:"}"#);
    }
}
