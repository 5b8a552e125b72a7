use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Module change delivered to an HMR channel
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// A new module was discovered; carries its info object
    Add(Map<String, Value>),
    /// A module was deleted
    Remove(String),
    /// A subscribed module changed; carries the change info
    Modify {
        specifier: String,
        payload: Map<String, Value>,
    },
}

type WatcherId = u64;
type SubscriptionId = u64;

#[derive(Default)]
struct HubState {
    next_id: u64,
    watchers: FxHashMap<WatcherId, mpsc::UnboundedSender<WatchEvent>>,
    /// Exactly one live subscription per (watcher, specifier)
    subscriptions: FxHashMap<(WatcherId, String), SubscriptionId>,
}

impl HubState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Fans module changes out to connected HMR channels.
///
/// Each channel gets its own [`ChannelWatcher`] with a single ordered queue,
/// so events for a module reach a channel in the order they were emitted.
/// Modify events only reach channels subscribed to that module.
#[derive(Clone, Default)]
pub struct WatchHub {
    state: Arc<Mutex<HubState>>,
}

impl WatchHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_watcher(&self) -> ChannelWatcher {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        let id = state.next_id();
        state.watchers.insert(id, tx);
        debug!("hmr watcher {} created", id);
        ChannelWatcher {
            id,
            hub: self.clone(),
            rx,
        }
    }

    pub fn emit_add(&self, info: Map<String, Value>) {
        let state = self.state.lock();
        for tx in state.watchers.values() {
            let _ = tx.send(WatchEvent::Add(info.clone()));
        }
    }

    /// Subscriptions are one-shot: each one that fires is consumed, and the
    /// client has to accept the module again to hear about the next change.
    pub fn emit_modify(&self, specifier: &str, payload: Map<String, Value>) {
        let mut state = self.state.lock();
        let fired: Vec<WatcherId> = state
            .subscriptions
            .keys()
            .filter(|(_, subscribed)| subscribed == specifier)
            .map(|(watcher, _)| *watcher)
            .collect();
        for watcher in fired {
            state.subscriptions.remove(&(watcher, specifier.to_string()));
            if let Some(tx) = state.watchers.get(&watcher) {
                let _ = tx.send(WatchEvent::Modify {
                    specifier: specifier.to_string(),
                    payload: payload.clone(),
                });
            }
        }
    }

    /// Tears down every subscription to `specifier`, then notifies all
    /// channels.
    pub fn emit_remove(&self, specifier: &str) {
        let mut state = self.state.lock();
        state.subscriptions.retain(|(_, subscribed), _| subscribed != specifier);
        for tx in state.watchers.values() {
            let _ = tx.send(WatchEvent::Remove(specifier.to_string()));
        }
    }

    pub fn subscriber_count(&self, specifier: &str) -> usize {
        self.state
            .lock()
            .subscriptions
            .keys()
            .filter(|(_, subscribed)| subscribed == specifier)
            .count()
    }

    pub fn watcher_count(&self) -> usize {
        self.state.lock().watchers.len()
    }

    fn subscribe(&self, watcher: WatcherId, specifier: &str) -> SubscriptionId {
        let mut state = self.state.lock();
        let id = state.next_id();
        state
            .subscriptions
            .insert((watcher, specifier.to_string()), id);
        id
    }

    fn unsubscribe(&self, watcher: WatcherId, specifier: &str, id: SubscriptionId) {
        let mut state = self.state.lock();
        let key = (watcher, specifier.to_string());
        if state.subscriptions.get(&key) == Some(&id) {
            state.subscriptions.remove(&key);
        }
    }

    fn remove_watcher(&self, watcher: WatcherId) {
        let mut state = self.state.lock();
        state.watchers.remove(&watcher);
        state.subscriptions.retain(|(owner, _), _| *owner != watcher);
        debug!("hmr watcher {} removed", watcher);
    }
}

/// One channel's view of the hub. Dropping it removes the watcher and all
/// of its subscriptions.
pub struct ChannelWatcher {
    id: WatcherId,
    hub: WatchHub,
    rx: mpsc::UnboundedReceiver<WatchEvent>,
}

impl ChannelWatcher {
    /// Subscribe to modify events for `specifier`. Subscribing again
    /// replaces the earlier subscription.
    pub fn subscribe(&self, specifier: &str) -> Subscription {
        let id = self.hub.subscribe(self.id, specifier);
        Subscription {
            hub: self.hub.clone(),
            watcher: self.id,
            specifier: specifier.to_string(),
            id,
        }
    }

    pub async fn recv(&mut self) -> Option<WatchEvent> {
        self.rx.recv().await
    }
}

impl Drop for ChannelWatcher {
    fn drop(&mut self) {
        self.hub.remove_watcher(self.id);
    }
}

/// Handle for one module subscription; dropping it unregisters exactly
/// this subscription.
pub struct Subscription {
    hub: WatchHub,
    watcher: WatcherId,
    specifier: String,
    id: SubscriptionId,
}

impl Subscription {
    pub fn specifier(&self) -> &str {
        &self.specifier
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.watcher, &self.specifier, self.id);
    }
}
