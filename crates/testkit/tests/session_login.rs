//! Session lifecycle tests against the mock server.

use quarry_net::{
    Clientbound, ConnectError, OfflineAuth, Serverbound, Session, SessionOptions, SessionState,
};
use quarry_testkit::{uniform_chunk, ChunkSpec, MockServer, MockServerConfig};
use std::time::Duration;
use tokio::time::{sleep, timeout};

#[tokio::test]
async fn test_connect_and_login() {
    let server = MockServer::spawn(MockServerConfig::default())
        .await
        .expect("spawn mock server");
    let auth = OfflineAuth::new("digger");

    let session = Session::connect(&server.addr(), &auth, SessionOptions::default())
        .await
        .expect("connect succeeds");

    assert_eq!(session.profile().username, "digger");
    assert_eq!(session.profile().session_id, 1);
    assert_eq!(session.state(), SessionState::Play);

    session.close("test done").await;

    let received = server.received();
    assert!(
        matches!(received.first(), Some(Serverbound::Handshake { .. })),
        "handshake arrives first, got {received:?}"
    );
    assert!(
        matches!(received.get(1), Some(Serverbound::LoginStart { .. })),
        "login follows the handshake"
    );
    server.shutdown().await;
}

#[tokio::test]
async fn test_login_rejected_surfaces_reason() {
    let server = MockServer::spawn(MockServerConfig {
        reject_login: Some("server full".to_string()),
        ..MockServerConfig::default()
    })
    .await
    .expect("spawn mock server");

    let auth = OfflineAuth::new("digger");
    let err = Session::connect(&server.addr(), &auth, SessionOptions::default())
        .await
        .expect_err("login should be rejected");

    match err {
        ConnectError::LoginRejected { reason } => assert_eq!(reason, "server full"),
        other => panic!("expected LoginRejected, got {other}"),
    }
    server.shutdown().await;
}

#[tokio::test]
async fn test_keepalives_are_echoed() {
    let server = MockServer::spawn(MockServerConfig {
        keepalive_interval: Some(Duration::from_millis(50)),
        ..MockServerConfig::default()
    })
    .await
    .expect("spawn mock server");

    let auth = OfflineAuth::new("digger");
    let session = Session::connect(&server.addr(), &auth, SessionOptions::default())
        .await
        .expect("connect succeeds");
    // No bus subscribers in this test; open dispatch by hand.
    session.start_dispatch();

    sleep(Duration::from_millis(300)).await;

    let echoes: Vec<u64> = server
        .received()
        .into_iter()
        .filter_map(|packet| match packet {
            Serverbound::KeepAlive { id } => Some(id),
            _ => None,
        })
        .collect();
    assert!(
        !echoes.is_empty(),
        "session echoes server keep-alives within the window"
    );

    session.close("test done").await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_missed_keepalive_window_is_fatal() {
    // A server that never pings: the watchdog must declare the session dead.
    let server = MockServer::spawn(MockServerConfig {
        keepalive_interval: None,
        ..MockServerConfig::default()
    })
    .await
    .expect("spawn mock server");

    let auth = OfflineAuth::new("digger");
    let session = Session::connect(
        &server.addr(),
        &auth,
        SessionOptions {
            keepalive_window: Duration::from_millis(200),
            ..SessionOptions::default()
        },
    )
    .await
    .expect("connect succeeds");

    let mut state = session.watch_state();
    let observed = timeout(Duration::from_secs(3), async {
        loop {
            if *state.borrow() == SessionState::Disconnected {
                return;
            }
            if state.changed().await.is_err() {
                return;
            }
        }
    })
    .await;
    assert!(observed.is_ok(), "watchdog flags the dead session");
    assert_eq!(session.state(), SessionState::Disconnected);

    server.shutdown().await;
}

#[tokio::test]
async fn test_pipelined_packets_wait_for_subscribers() {
    // The mock pipelines inventory and chunk data right behind the login
    // acceptance; a subscriber attaching after connect must still see them.
    let server = MockServer::spawn(MockServerConfig {
        chunks: vec![ChunkSpec {
            x: 0,
            z: 0,
            blocks: uniform_chunk(1),
        }],
        ..MockServerConfig::default()
    })
    .await
    .expect("spawn mock server");

    let auth = OfflineAuth::new("digger");
    let session = Session::connect(&server.addr(), &auth, SessionOptions::default())
        .await
        .expect("connect succeeds");

    let mut packets = session.subscribe();
    session.start_dispatch();

    let first = timeout(Duration::from_secs(2), packets.recv())
        .await
        .expect("bus delivers the held packets")
        .expect("bus open");
    assert!(matches!(first, Clientbound::WindowItems { .. }), "got {first:?}");

    let second = timeout(Duration::from_secs(2), packets.recv())
        .await
        .expect("bus delivers the chunk")
        .expect("bus open");
    assert!(matches!(second, Clientbound::ChunkData(_)), "got {second:?}");

    session.close("test done").await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_close_announces_disconnect() {
    let server = MockServer::spawn(MockServerConfig::default())
        .await
        .expect("spawn mock server");
    let auth = OfflineAuth::new("digger");
    let session = Session::connect(&server.addr(), &auth, SessionOptions::default())
        .await
        .expect("connect succeeds");

    session.close("done digging").await;
    sleep(Duration::from_millis(100)).await;

    let said_goodbye = server.received().into_iter().any(|packet| {
        matches!(packet, Serverbound::Disconnect { reason } if reason == "done digging")
    });
    assert!(said_goodbye, "close sends the disconnect notification");
    server.shutdown().await;
}
