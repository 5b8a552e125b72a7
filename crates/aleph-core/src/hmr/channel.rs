use futures::{Stream, StreamExt};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use super::hub::{Subscription, WatchEvent, WatchHub};
use crate::cache::ModuleStore;
use crate::paths::{clean_path, trim_module_ext};

/// Transport-independent websocket frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ClientMessage {
    HotAccept { specifier: String },
}

/// Serves one HMR websocket.
///
/// The connection is upgraded before [`HmrChannel::run`] is called; the
/// channel is open while `run` is looping and closed once it returns, at
/// which point every subscription it made has been released.
pub struct HmrChannel {
    hub: WatchHub,
    store: Arc<ModuleStore>,
    base_path: String,
}

impl HmrChannel {
    pub fn new(hub: WatchHub, store: Arc<ModuleStore>, base_path: impl Into<String>) -> Self {
        Self {
            hub,
            store,
            base_path: base_path.into(),
        }
    }

    /// Pump messages until the client closes or the outgoing side goes away.
    pub async fn run<S>(&self, incoming: S, outgoing: mpsc::UnboundedSender<String>)
    where
        S: Stream<Item = Frame>,
    {
        let mut incoming = std::pin::pin!(incoming);
        let mut watcher = self.hub.create_watcher();
        let mut subscriptions: FxHashMap<String, Subscription> = FxHashMap::default();
        debug!("hmr channel open");

        loop {
            tokio::select! {
                frame = incoming.next() => match frame {
                    Some(Frame::Text(text)) => {
                        if let Some(specifier) = self.accepted_specifier(&text) {
                            let subscription = watcher.subscribe(&specifier);
                            subscriptions.insert(specifier, subscription);
                        }
                    }
                    Some(Frame::Close) | None => break,
                },
                event = watcher.recv() => {
                    let Some(event) = event else { break };
                    // a fired subscription is already gone from the hub; its
                    // handle is replaced by the next accept
                    if let WatchEvent::Remove(specifier) = &event {
                        subscriptions.remove(specifier);
                    }
                    if outgoing.send(self.encode(event).to_string()).is_err() {
                        break;
                    }
                }
            }
        }

        drop(subscriptions);
        drop(watcher);
        debug!("hmr channel closed");
    }

    /// Specifier of a known module the client wants updates for
    fn accepted_specifier(&self, text: &str) -> Option<String> {
        let message = match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                debug!("ignoring hmr message {:?}: {}", text, e);
                return None;
            }
        };
        let ClientMessage::HotAccept { specifier } = message;
        match self.store.get(&specifier) {
            Some(record) => Some(record.specifier.clone()),
            None => {
                debug!("hot accept for unknown module {}", specifier);
                None
            }
        }
    }

    fn encode(&self, event: WatchEvent) -> Value {
        match event {
            WatchEvent::Add(mut info) => {
                info.insert("type".into(), json!("add"));
                Value::Object(info)
            }
            WatchEvent::Remove(specifier) => json!({
                "type": "remove",
                "specifier": specifier,
            }),
            WatchEvent::Modify { specifier, payload } => {
                let mut message: Map<String, Value> = payload;
                message.insert("type".into(), json!("update"));
                message.insert(
                    "updateUrl".into(),
                    json!(update_url(&self.base_path, &specifier)),
                );
                message.insert("specifier".into(), json!(specifier));
                Value::Object(message)
            }
        }
    }
}

/// Build-output url clients re-import after an update
pub fn update_url(base_path: &str, specifier: &str) -> String {
    clean_path(&format!(
        "{}/_aleph/{}.js",
        base_path,
        trim_module_ext(specifier)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ModuleRecord;

    #[test]
    fn test_update_url() {
        assert_eq!(update_url("/", "/pages/index.tsx"), "/_aleph/pages/index.js");
        assert_eq!(
            update_url("/blog", "/components/nav.jsx"),
            "/blog/_aleph/components/nav.js"
        );
    }

    #[test]
    fn test_accepts_only_known_modules() {
        let store = Arc::new(ModuleStore::new());
        store.insert(ModuleRecord::new("/pages/index.tsx", "code", "h".into()));
        let channel = HmrChannel::new(WatchHub::new(), store, "/");

        assert_eq!(
            channel.accepted_specifier(r#"{"type":"hotAccept","specifier":"/pages/index.tsx"}"#),
            Some("/pages/index.tsx".to_string())
        );
        assert_eq!(
            channel.accepted_specifier(r#"{"type":"hotAccept","specifier":"/pages/gone.tsx"}"#),
            None
        );
        assert_eq!(channel.accepted_specifier("not json"), None);
        assert_eq!(channel.accepted_specifier(r#"{"type":"ping"}"#), None);
    }

    #[test]
    fn test_update_message_shape() {
        let channel = HmrChannel::new(WatchHub::new(), Arc::new(ModuleStore::new()), "/");
        let mut payload = Map::new();
        payload.insert("refreshPage".into(), json!(true));
        let message = channel.encode(WatchEvent::Modify {
            specifier: "/pages/index.tsx".into(),
            payload,
        });
        assert_eq!(
            message,
            json!({
                "type": "update",
                "specifier": "/pages/index.tsx",
                "updateUrl": "/_aleph/pages/index.js",
                "refreshPage": true,
            })
        );
    }
}
