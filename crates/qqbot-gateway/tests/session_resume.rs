use std::time::Duration;

use futures::StreamExt;
use qqbot_core::{Credentials, ResumeToken};
use qqbot_gateway::{
    ConnectionState, GatewayConfig, SessionManager,
    memory::{self, MemoryGateway, ServerConnection},
};
use serde_json::{Value, json};

fn hello() -> String {
    json!({"op": 10, "d": {"heartbeat_interval": 45_000}}).to_string()
}

fn ready(session_id: &str) -> String {
    json!({"op": 0, "t": "READY", "d": {"session_id": session_id}}).to_string()
}

fn dispatch(sequence: u64) -> String {
    json!({
        "op": 0,
        "s": sequence,
        "t": "GROUP_AT_MESSAGE_CREATE",
        "d": {"id": format!("m{sequence}"), "group_openid": "g", "content": "hi"}
    })
    .to_string()
}

fn manager(connector: memory::MemoryConnector) -> SessionManager<memory::MemoryConnector> {
    SessionManager::new(
        connector,
        "memory://gateway",
        Credentials::new("1", "t"),
        GatewayConfig::default(),
    )
}

async fn accept(gateway: &mut MemoryGateway) -> ServerConnection {
    tokio::time::timeout(Duration::from_secs(5), gateway.accept())
        .await
        .expect("client should reconnect")
        .expect("connector alive")
}

async fn recv_op(server: &mut ServerConnection, op: u8) -> Value {
    tokio::time::timeout(Duration::from_secs(5), server.recv_op(op))
        .await
        .expect("frame expected")
        .expect("client alive")
}

/// Every frame left on a socket the client has closed.
async fn drain(server: &mut ServerConnection) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Some(frame) = tokio::time::timeout(Duration::from_secs(5), server.recv_json())
        .await
        .expect("old socket should close")
    {
        frames.push(frame);
    }
    frames
}

#[tokio::test]
async fn test_reconnect_request_resumes_with_last_sequence() {
    let (connector, mut gateway) = memory::channel();
    let (mut events, _task) = manager(connector).spawn();

    let mut server = accept(&mut gateway).await;
    server.send(hello());
    let identify = recv_op(&mut server, 2).await;
    assert_eq!(identify["d"]["token"], "Bot 1.t");
    server.send(ready("abc"));

    for sequence in 1..=3 {
        server.send(dispatch(sequence));
    }
    for expected in 1..=3 {
        let event = events.next().await.unwrap();
        assert_eq!(event.s, Some(expected));
    }
    server.send(json!({"op": 7}).to_string());

    let mut resumed = accept(&mut gateway).await;
    resumed.send(hello());
    let resume = recv_op(&mut resumed, 6).await;
    assert_eq!(resume["d"]["session_id"], "abc");
    assert_eq!(resume["d"]["seq"], 3);

    resumed.send(dispatch(4));
    assert_eq!(events.next().await.unwrap().s, Some(4));

    // Only heartbeats sent before the reconnect, then the old socket is closed.
    let leftover = drain(&mut server).await;
    assert!(leftover.iter().all(|frame| frame["op"] == 1), "{leftover:?}");
    assert!(leftover.len() <= 1);
}

#[tokio::test]
async fn test_handshake_failure_starts_fresh_session() {
    let (connector, mut gateway) = memory::channel();
    let (mut events, _task) = manager(connector).spawn();

    let mut server = accept(&mut gateway).await;
    server.send(hello());
    recv_op(&mut server, 2).await;
    server.send(ready("abc"));
    server.send(dispatch(1));
    assert_eq!(events.next().await.unwrap().s, Some(1));
    drop(server);

    // Resume attempt whose hello never arrives.
    drop(accept(&mut gateway).await);

    let mut server = accept(&mut gateway).await;
    server.send(hello());
    let identify = recv_op(&mut server, 2).await;
    assert_eq!(identify["op"], 2);
}

#[tokio::test]
async fn test_survives_disconnects_at_every_stage() {
    let (connector, mut gateway) = memory::channel();
    let session = manager(connector);
    let mut status = session.status();
    let (mut events, _task) = session.spawn();

    // Drop on accept.
    drop(accept(&mut gateway).await);

    // Drop after hello.
    let server = accept(&mut gateway).await;
    server.send(hello());
    drop(server);

    // Drop while identifying.
    let mut server = accept(&mut gateway).await;
    server.send(hello());
    recv_op(&mut server, 2).await;
    drop(server);

    // Drop once ready, before any sequence: nothing to resume.
    let mut server = accept(&mut gateway).await;
    server.send(hello());
    recv_op(&mut server, 2).await;
    server.send(ready("s1"));
    recv_op(&mut server, 1).await;
    drop(server);

    // Drop after traffic: the next attempt resumes.
    let mut server = accept(&mut gateway).await;
    server.send(hello());
    recv_op(&mut server, 2).await;
    server.send(ready("s2"));
    server.send(dispatch(10));
    assert_eq!(events.next().await.unwrap().s, Some(10));
    drop(server);

    let mut server = accept(&mut gateway).await;
    server.send(hello());
    let resume = recv_op(&mut server, 6).await;
    assert_eq!(resume["d"]["session_id"], "s2");
    assert_eq!(resume["d"]["seq"], 10);

    status
        .wait_for(|s| s.state == ConnectionState::Ready)
        .await
        .unwrap();
    let current = status.borrow().clone();
    assert_eq!(current.attempts, 6);
    assert_eq!(
        current.resumed_from,
        Some(ResumeToken {
            session_id: "s2".to_string(),
            sequence: 10
        })
    );

    server.send(dispatch(11));
    server.send(dispatch(12));
    assert_eq!(events.next().await.unwrap().s, Some(11));
    assert_eq!(events.next().await.unwrap().s, Some(12));
}

#[tokio::test]
async fn test_sequences_forwarded_in_wire_order() {
    let (connector, mut gateway) = memory::channel();
    let (events, _task) = manager(connector).spawn();

    let mut server = accept(&mut gateway).await;
    server.send(hello());
    recv_op(&mut server, 2).await;
    server.send(ready("abc"));
    for sequence in 1..=50 {
        server.send(dispatch(sequence));
    }

    let seen: Vec<u64> = events
        .take(50)
        .map(|event| event.s.unwrap())
        .collect()
        .await;
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(seen, (1..=50).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_dropping_stream_stops_manager() {
    let (connector, mut gateway) = memory::channel();
    let (events, task) = manager(connector).spawn();

    let mut server = accept(&mut gateway).await;
    server.send(hello());
    recv_op(&mut server, 2).await;
    server.send(ready("abc"));
    drop(events);
    server.send(dispatch(1));

    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("manager should stop")
        .unwrap();
}

#[tokio::test]
async fn test_dropping_stream_on_idle_connection_stops_manager() {
    let (connector, mut gateway) = memory::channel();
    let (events, task) = manager(connector).spawn();

    let mut server = accept(&mut gateway).await;
    server.send(hello());
    recv_op(&mut server, 2).await;
    server.send(ready("abc"));
    recv_op(&mut server, 1).await;
    drop(events);

    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("manager should stop without further traffic")
        .unwrap();
    assert!(drain(&mut server).await.is_empty());
}
