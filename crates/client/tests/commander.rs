//! Command layer over the in-memory connector: calls, pushes and the
//! lifecycle hooks of the handler registry.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{MockConnector, MockPeer};
use parking_lot::Mutex;
use rws_client::{CommandError, Commander, DisconnectReason, HandlerRegistry, Session, DENIED};
use serde_json::{json, Value};
use tokio::sync::mpsc;

fn start(registry: HandlerRegistry) -> (Commander, mpsc::UnboundedReceiver<MockPeer>) {
    let (connector, peers) = MockConnector::new();
    let commander = Commander::connect(Session::builder(common::URL).connector(connector), registry)
        .expect("commander starts");
    (commander, peers)
}

#[tokio::test(start_paused = true)]
async fn call_resolves_with_the_matching_response() {
    let (commander, mut peers) = start(HandlerRegistry::new());
    let mut peer = peers.recv().await.unwrap();
    peer.accept();

    let server = async {
        let request = peer.next_sent().await.unwrap();
        assert_eq!(request, r#"["get_tags",1,"inbox"]"#);
        peer.push(r#"[1,["a","b"]]"#);
    };
    let args = [json!("inbox")];
    let (reply, ()) = tokio::join!(commander.call("get_tags", &args), server);

    assert_eq!(reply.unwrap(), vec![json!(["a", "b"])]);
    assert_eq!(commander.pending_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn call_made_before_handshake_is_delivered_after_it() {
    let (commander, mut peers) = start(HandlerRegistry::new());

    let server = async {
        let mut peer = peers.recv().await.unwrap();
        peer.open();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(peer.drain_sent().is_empty());

        peer.push(rws_client::HI);
        let request = peer.next_sent().await.unwrap();
        assert_eq!(request, r#"["count",1]"#);
        peer.push("[1,42]");
        peer
    };
    let (reply, _peer) = tokio::join!(commander.call("count", &[]), server);
    assert_eq!(reply.unwrap(), vec![json!(42)]);
}

#[tokio::test(start_paused = true)]
async fn fire_and_forget_has_no_callback_id() {
    let (commander, mut peers) = start(HandlerRegistry::new());
    let mut peer = peers.recv().await.unwrap();
    peer.accept();

    commander.send("mark_read", &[json!(7), json!(true)]);
    assert_eq!(peer.next_sent().await.as_deref(), Some(r#"["mark_read",7,true]"#));
    assert_eq!(commander.pending_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn call_timeout_forgets_the_callback() {
    let (commander, mut peers) = start(HandlerRegistry::new());
    let peer = peers.recv().await.unwrap();
    peer.accept();

    let err = commander
        .call_timeout("slow", &[], Duration::from_secs(2))
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::Timeout(d) if d == Duration::from_secs(2)));
    assert_eq!(commander.pending_calls(), 0);

    // A late response is ignored.
    peer.push("[1,\"late\"]");
}

#[tokio::test(start_paused = true)]
async fn pushes_and_lifecycle_hooks_reach_the_registry() {
    let seen: Arc<Mutex<Vec<String>>> = Arc::default();
    let (s1, s2, s3) = (seen.clone(), seen.clone(), seen.clone());
    let registry = HandlerRegistry::new()
        .on("notification", move |args: Vec<Value>| {
            s1.lock().push(format!("notification {}", args[0]));
        })
        .on_connect(move || s2.lock().push("connect".into()))
        .on_disconnect(move |reason, _| s3.lock().push(format!("disconnect {reason}")));
    let (_commander, mut peers) = start(registry);

    let peer = peers.recv().await.unwrap();
    peer.accept();
    peer.push(r#"["notification","hello"]"#);
    peer.push(r#"["unregistered",1]"#);
    peer.push(r#"["bye"]"#);
    let _next = peers.recv().await.unwrap();

    assert_eq!(
        *seen.lock(),
        vec![
            "connect".to_string(),
            "notification \"hello\"".to_string(),
            format!("disconnect {}", DisconnectReason::Bye),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn prune_and_close_abandon_outstanding_calls() {
    let (commander, mut peers) = start(HandlerRegistry::new());
    let peer = peers.recv().await.unwrap();
    peer.accept();

    let pruned = async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        commander.prune_stale(Duration::from_secs(10))
    };
    let (reply, count) = tokio::join!(commander.call("never", &[]), pruned);
    assert_eq!(count, 1);
    assert!(matches!(reply, Err(CommandError::Abandoned)));

    let closing = async {
        tokio::task::yield_now().await;
        commander.close();
    };
    let (reply, ()) = tokio::join!(commander.call("never", &[]), closing);
    assert!(matches!(reply, Err(CommandError::Abandoned)));

    assert!(matches!(
        commander.call("after", &[]).await,
        Err(CommandError::Closed)
    ));
}

#[tokio::test(start_paused = true)]
async fn denied_handshake_abandons_waiting_calls() {
    let (commander, mut peers) = start(HandlerRegistry::new());
    let peer = peers.recv().await.unwrap();
    peer.open();

    let denying = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(commander.pending_calls(), 1);
        peer.push(DENIED);
    };
    let (reply, ()) = tokio::time::timeout(
        Duration::from_secs(3600),
        async { tokio::join!(commander.call("count", &[]), denying) },
    )
    .await
    .expect("call resolves once the session is denied");

    assert!(matches!(reply, Err(CommandError::Abandoned)), "{reply:?}");
    assert_eq!(commander.pending_calls(), 0);
    assert!(commander.session().is_closed());
}
