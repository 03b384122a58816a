//! Event listeners keyed by event type.

use std::collections::HashMap;
use std::fmt;

use roomsync_types::Event;

/// A callback invoked for every incoming event of a registered type.
///
/// Listeners run inline on the sync loop. A listener that blocks stalls
/// syncing; hand long-running work off to another task.
pub type Listener = Box<dyn Fn(&Event) + Send + Sync>;

/// Ordered listeners per event type.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: HashMap<String, Vec<Listener>>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for events of `event_type`.
    ///
    /// Listeners are called in registration order. There are no duplicate
    /// checks.
    pub fn on_event_type<F>(&mut self, event_type: impl Into<String>, callback: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.listeners
            .entry(event_type.into())
            .or_default()
            .push(Box::new(callback));
    }

    /// Call every listener registered for the event's type.
    pub fn dispatch(&self, event: &Event) {
        let Some(listeners) = self.listeners.get(&event.event_type) else {
            return;
        };
        for listener in listeners {
            listener(event);
        }
    }

    /// Number of listeners registered for `event_type`.
    pub fn count(&self, event_type: &str) -> usize {
        self.listeners.get(event_type).map_or(0, Vec::len)
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<&str, usize> = self
            .listeners
            .iter()
            .map(|(event_type, listeners)| (event_type.as_str(), listeners.len()))
            .collect();
        f.debug_struct("ListenerRegistry")
            .field("listeners", &counts)
            .finish()
    }
}
