//! Pure subscription registry for the STOMP client
//!
//! One handler per destination: re-registering replaces the prior entry and
//! its handler never fires again. Entries registered before the connection is
//! up stay pending and are drained exactly once per connection inside the
//! post-connect step; on disconnect every entry becomes pending again so the
//! next connection replays the full set.

use std::collections::HashMap;

/// Inbound message callback, invoked serially by the connection task
pub type MessageHandler = Box<dyn FnMut(&[u8]) + Send>;

struct Entry {
    id: String,
    handler: MessageHandler,
    /// Whether a SUBSCRIBE frame for this entry is live on the current connection
    active: bool,
}

/// Outcome of a registration
pub struct Registered {
    /// Subscription id assigned to the new entry
    pub id: String,
    /// Id of a replaced active entry that needs an UNSUBSCRIBE on the wire
    pub replaced_active_id: Option<String>,
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: HashMap<String, Entry>,
    next_id: u64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a destination, replacing any prior entry
    pub fn register(&mut self, destination: &str, handler: MessageHandler) -> Registered {
        let id = format!("sub-{}", self.next_id);
        self.next_id += 1;

        let replaced = self.entries.insert(
            destination.to_string(),
            Entry {
                id: id.clone(),
                handler,
                active: false,
            },
        );

        Registered {
            id,
            replaced_active_id: replaced.filter(|e| e.active).map(|e| e.id),
        }
    }

    /// Remove a destination. Returns the subscription id if the entry was
    /// live on the wire (the caller owes an UNSUBSCRIBE frame).
    pub fn remove(&mut self, destination: &str) -> Option<String> {
        self.entries
            .remove(destination)
            .filter(|e| e.active)
            .map(|e| e.id)
    }

    /// Mark one entry live after its SUBSCRIBE frame went out
    pub fn mark_active(&mut self, destination: &str) {
        if let Some(entry) = self.entries.get_mut(destination) {
            entry.active = true;
        }
    }

    /// Mark everything pending again (connection lost)
    pub fn mark_all_inactive(&mut self) {
        for entry in self.entries.values_mut() {
            entry.active = false;
        }
    }

    /// Drain all pending entries as `(id, destination)` pairs, marking them
    /// active. Called once per successful connection.
    pub fn drain_pending(&mut self) -> Vec<(String, String)> {
        let mut drained: Vec<(String, String)> = self
            .entries
            .iter_mut()
            .filter(|(_, e)| !e.active)
            .map(|(dest, e)| {
                e.active = true;
                (e.id.clone(), dest.clone())
            })
            .collect();
        // Stable order keeps the replayed SUBSCRIBE sequence deterministic
        drained.sort_by(|a, b| a.1.cmp(&b.1));
        drained
    }

    /// Dispatch a MESSAGE frame body to the handler for its destination.
    ///
    /// The subscription id must match the current entry; late messages for a
    /// replaced subscription are dropped. Returns whether a handler ran.
    pub fn dispatch(&mut self, destination: &str, subscription_id: Option<&str>, body: &[u8]) -> bool {
        match self.entries.get_mut(destination) {
            Some(entry) => {
                if let Some(sub_id) = subscription_id {
                    if sub_id != entry.id {
                        return false;
                    }
                }
                (entry.handler)(body);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
