//! Cross-crate flows: fetch through the client, persist in the store

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use workloft_client::{Client, ClientConfig, Filter, Method as HttpMethod, TaskState};
use workloft_store::LocalStore;

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
struct Item {
    item_id: u64,
    title: String,
}

fn client_for(server: &MockServer) -> Client {
    let config = ClientConfig::default()
        .with_base_url(server.uri())
        .with_timeout(Duration::from_secs(5));
    Client::new(config).expect("client")
}

#[tokio::test]
async fn test_fetched_items_survive_a_store_reopen() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/item/5"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"item_id": 5, "title": "Cached"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let root = tempfile::tempdir().unwrap();
    let client = client_for(&server);

    let fetch = client.request::<Item>(HttpMethod::GET, &Filter::new("item").segment("5"), None);
    assert_eq!(fetch.wait().await, TaskState::Succeeded);
    let item = fetch.result().expect("result");

    let store = LocalStore::open_in(root.path(), "items", 64);
    assert_eq!(
        store.set("item/5", &*item).wait().await,
        TaskState::Succeeded
    );
    drop(store);

    // A fresh handle over the same root serves the item from disk, no
    // network involved.
    let reopened = LocalStore::open_in(root.path(), "items", 64);
    let cached = reopened.get::<Item>("item/5");
    cached.wait().await;
    assert_eq!(cached.result().as_deref(), Some(&Some((*item).clone())));
    server.verify().await;
}

#[tokio::test]
async fn test_error_listener_consume_stops_global_bubbling() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/item/404"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": "not_found",
            "error_description": "Item not found"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let order = Arc::new(Mutex::new(Vec::new()));
    let globals = Arc::new(AtomicU32::new(0));

    let g = globals.clone();
    client.add_global_error_listener(move |_| {
        g.fetch_add(1, Ordering::SeqCst);
        false
    });

    // L2 consumes, so L3 and the global listener never run.
    let filter = Filter::new("item").segment("404");
    let task = client.request::<Item>(HttpMethod::GET, &filter, None);
    for (tag, consume) in [("l1", false), ("l2", true), ("l3", false)] {
        let order = order.clone();
        task.on_error(move |_| {
            order.lock().unwrap().push(tag);
            consume
        });
    }
    assert_eq!(task.wait().await, TaskState::Failed);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*order.lock().unwrap(), vec!["l1", "l2"]);
    assert_eq!(globals.load(Ordering::SeqCst), 0);

    // No consumer this time: the global listener gets its turn.
    let task = client.request::<Item>(HttpMethod::GET, &filter, None);
    task.on_error(|_| false);
    assert_eq!(task.wait().await, TaskState::Failed);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(globals.load(Ordering::SeqCst), 1);
}
