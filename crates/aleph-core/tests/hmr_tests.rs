use aleph_core::cache::{ModuleRecord, ModuleStore};
use aleph_core::hmr::{Frame, HmrChannel, WatchHub};
use futures::channel::mpsc as frames;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const INDEX: &str = "/pages/index.tsx";

struct Client {
    frames: frames::UnboundedSender<Frame>,
    messages: mpsc::UnboundedReceiver<String>,
    task: JoinHandle<()>,
}

impl Client {
    fn send(&self, text: &str) {
        self.frames
            .unbounded_send(Frame::Text(text.to_string()))
            .unwrap();
    }

    async fn next(&mut self) -> Value {
        let text = timeout(Duration::from_secs(2), self.messages.recv())
            .await
            .expect("message in time")
            .expect("channel open");
        serde_json::from_str(&text).unwrap()
    }

    async fn assert_silent(&mut self) {
        let next = timeout(Duration::from_millis(100), self.messages.recv()).await;
        assert!(next.is_err(), "unexpected message: {:?}", next);
    }
}

fn store() -> Arc<ModuleStore> {
    let store = Arc::new(ModuleStore::new());
    store.insert(ModuleRecord::new(INDEX, "code", "h".into()));
    store
}

fn connect(hub: &WatchHub, store: Arc<ModuleStore>, base_path: &str) -> Client {
    let (frame_tx, frame_rx) = frames::unbounded();
    let (tx, rx) = mpsc::unbounded_channel();
    let channel = HmrChannel::new(hub.clone(), store, base_path);
    let task = tokio::spawn(async move { channel.run(frame_rx, tx).await });
    Client {
        frames: frame_tx,
        messages: rx,
        task,
    }
}

async fn wait_for_subscribers(hub: &WatchHub, specifier: &str, count: usize) {
    timeout(Duration::from_secs(2), async {
        while hub.subscriber_count(specifier) != count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("subscription registered");
}

fn refresh(value: bool) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("refreshPage".into(), json!(value));
    payload
}

#[tokio::test]
async fn test_hot_accept_then_modify_sends_one_update() {
    let hub = WatchHub::new();
    let mut client = connect(&hub, store(), "/");

    let accept = r#"{"type":"hotAccept","specifier":"/pages/index.tsx"}"#;
    client.send(accept);
    client.send(accept);
    wait_for_subscribers(&hub, INDEX, 1).await;

    hub.emit_modify(INDEX, refresh(false));
    hub.emit_modify(INDEX, refresh(false));
    assert_eq!(
        client.next().await,
        json!({
            "type": "update",
            "specifier": "/pages/index.tsx",
            "updateUrl": "/_aleph/pages/index.js",
            "refreshPage": false,
        })
    );
    client.assert_silent().await;
    assert_eq!(hub.subscriber_count(INDEX), 0);

    // the client accepts again after re-importing the module
    client.send(accept);
    wait_for_subscribers(&hub, INDEX, 1).await;
    hub.emit_modify(INDEX, refresh(true));
    assert_eq!(client.next().await["refreshPage"], true);
    client.assert_silent().await;
}

#[tokio::test]
async fn test_update_url_includes_base_path() {
    let hub = WatchHub::new();
    let mut client = connect(&hub, store(), "/docs");
    client.send(r#"{"type":"hotAccept","specifier":"/pages/index.tsx"}"#);
    wait_for_subscribers(&hub, INDEX, 1).await;

    hub.emit_modify(INDEX, Map::new());
    assert_eq!(client.next().await["updateUrl"], "/docs/_aleph/pages/index.js");
}

#[tokio::test]
async fn test_remove_tears_down_listener() {
    let hub = WatchHub::new();
    let mut client = connect(&hub, store(), "/");
    client.send(r#"{"type":"hotAccept","specifier":"/pages/index.tsx"}"#);
    wait_for_subscribers(&hub, INDEX, 1).await;

    hub.emit_remove(INDEX);
    assert_eq!(
        client.next().await,
        json!({ "type": "remove", "specifier": "/pages/index.tsx" })
    );
    assert_eq!(hub.subscriber_count(INDEX), 0);

    hub.emit_modify(INDEX, refresh(true));
    client.assert_silent().await;
}

#[tokio::test]
async fn test_add_reaches_every_channel() {
    let hub = WatchHub::new();
    let mut first = connect(&hub, store(), "/");
    let mut second = connect(&hub, store(), "/");
    timeout(Duration::from_secs(2), async {
        while hub.watcher_count() != 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let mut module = Map::new();
    module.insert("specifier".into(), json!("/pages/new.tsx"));
    module.insert("routePath".into(), json!("/new"));
    hub.emit_add(module);

    let expected = json!({ "type": "add", "specifier": "/pages/new.tsx", "routePath": "/new" });
    assert_eq!(first.next().await, expected);
    assert_eq!(second.next().await, expected);
}

#[tokio::test]
async fn test_malformed_and_unknown_messages_are_ignored() {
    let hub = WatchHub::new();
    let mut client = connect(&hub, store(), "/");

    client.send("{not json");
    client.send(r#"{"type":"ping"}"#);
    client.send(r#"{"type":"hotAccept","specifier":"/pages/unknown.tsx"}"#);
    client.send(r#"{"type":"hotAccept","specifier":"/pages/index.tsx"}"#);
    wait_for_subscribers(&hub, INDEX, 1).await;

    assert_eq!(hub.subscriber_count("/pages/unknown.tsx"), 0);
    hub.emit_modify(INDEX, Map::new());
    assert_eq!(client.next().await["type"], "update");
}

#[tokio::test]
async fn test_close_removes_watcher() {
    let hub = WatchHub::new();
    let client = connect(&hub, store(), "/");
    client.send(r#"{"type":"hotAccept","specifier":"/pages/index.tsx"}"#);
    wait_for_subscribers(&hub, INDEX, 1).await;

    client.frames.unbounded_send(Frame::Close).unwrap();
    timeout(Duration::from_secs(2), client.task)
        .await
        .expect("channel closed")
        .unwrap();

    assert_eq!(hub.watcher_count(), 0);
    assert_eq!(hub.subscriber_count(INDEX), 0);
}

#[tokio::test]
async fn test_events_keep_emission_order() {
    let hub = WatchHub::new();
    let mut client = connect(&hub, store(), "/");

    for n in 0..3 {
        client.send(r#"{"type":"hotAccept","specifier":"/pages/index.tsx"}"#);
        wait_for_subscribers(&hub, INDEX, 1).await;
        let mut payload = Map::new();
        payload.insert("n".into(), json!(n));
        hub.emit_modify(INDEX, payload);
    }
    let mut module = Map::new();
    module.insert("specifier".into(), json!("/pages/new.tsx"));
    hub.emit_add(module);
    hub.emit_remove(INDEX);

    for n in 0..3 {
        assert_eq!(client.next().await["n"], n);
    }
    assert_eq!(client.next().await["type"], "add");
    assert_eq!(client.next().await["type"], "remove");
}
