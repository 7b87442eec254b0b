//! Drives a single link against a mock peer. Time is paused: timers fire at their exact deadline.

use super::mock::{server_info_response, MockConnector, MockMode, MockPeer};
use crate::{
    error::LinkError,
    link::{AliveState, Link, LinkConfig, LinkEvent, LinkHandle, LinkId, LinkOptions, Metadata},
    protocol::Command,
    role::Role,
};
use assert_matches::assert_matches;
use rstest::{fixture, rstest};
use std::{sync::Arc, time::Duration};
use tokio::{sync::mpsc, time::Instant};
use tokio_util::sync::CancellationToken;

const ENDPOINT: &str = "wss://s1.ripple.test";

struct TestLink {
    handle: LinkHandle,
    events: mpsc::UnboundedReceiver<LinkEvent>,
    peers: mpsc::UnboundedReceiver<MockPeer>,
}

impl TestLink {
    async fn peer(&mut self) -> MockPeer {
        self.peers.recv().await.expect("Link never connected")
    }

    /// Connects and completes the handshake.
    async fn alive_peer(&mut self) -> MockPeer {
        let mut peer = self.peer().await;
        let handshake = peer.expect_command("server_info").await;
        peer.reply_server_info(&handshake);
        assert_eq!(self.events.recv().await, Some(LinkEvent { link: LinkId(0), alive: true }));
        peer
    }
}

fn spawn_link(mode: MockMode, options: LinkOptions) -> TestLink {
    let (connector, peers) = MockConnector::new(mode);
    let (events_sender, events) = mpsc::unbounded_channel();
    let handle = Link::spawn(
        LinkConfig {
            id: LinkId(0),
            endpoint: ENDPOINT.to_string(),
            role: Role::CurrentLedger,
            metadata: Metadata::new(),
            options,
        },
        Arc::new(connector),
        events_sender,
        CancellationToken::new(),
    );
    TestLink { handle, events, peers }
}

#[fixture]
fn link() -> TestLink {
    spawn_link(MockMode::Accept, LinkOptions::default())
}

const DEAD: Option<LinkEvent> = Some(LinkEvent { link: LinkId(0), alive: false });

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_handshake(#[from(link)] mut t: TestLink) {
    let mut peer = t.peer().await;
    let handshake = peer.expect_command("server_info").await;
    assert_eq!(handshake.tag().and_then(|tag| tag.suppress_response), Some(true));
    assert_eq!(t.handle.alive_state(), AliveState::Unknown);
    assert!(t.handle.status().socket_open);

    peer.reply_server_info(&handshake);
    assert_eq!(t.events.recv().await, Some(LinkEvent { link: LinkId(0), alive: true }));

    let status = t.handle.status();
    assert_eq!(status.alive, AliveState::Alive);
    let info = status.server_info.expect("Handshake payload is kept");
    assert_eq!(info.build_version, "2.3.0");
    assert_eq!(info.hostid.as_deref(), Some("ANVIL"));
    assert_eq!(info.complete_ledgers.as_deref(), Some("32570-91000000"));
    assert!(t.handle.is_alive());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_later_server_info_refreshes_snapshot(#[from(link)] mut t: TestLink) {
    let peer = t.alive_peer().await;
    peer.send_json(server_info_response(&Command::server_info(), "2.4.0"));

    let mut status = t.handle.subscribe();
    let status = status
        .wait_for(|status| status.server_info.as_ref().is_some_and(|info| info.build_version == "2.4.0"))
        .await
        .unwrap()
        .clone();
    assert_eq!(status.alive, AliveState::Alive);
    assert_matches!(t.events.try_recv(), Err(_));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_pongs_keep_link_alive(#[from(link)] mut t: TestLink) {
    let start = Instant::now();
    let mut peer = t.alive_peer().await;

    for _ in 0..10 {
        let ping = peer.expect_command("ping").await;
        assert_eq!(ping.tag().and_then(|tag| tag.pong), Some(true));
        peer.reply_pong(&ping);
    }
    assert_eq!(start.elapsed(), Duration::from_millis(10 * 1500));

    // The last pong has been handled before the next probe went out.
    peer.expect_command("ping").await;
    assert_eq!(t.handle.status().unanswered_pings, 1);
    assert!(t.handle.is_alive());
    assert_matches!(t.events.try_recv(), Err(_));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_silent_peer_dies_on_fourth_ping(#[from(link)] mut t: TestLink) {
    let opened = Instant::now();
    let mut peer = t.alive_peer().await;

    assert_eq!(t.events.recv().await, DEAD);
    assert_eq!(opened.elapsed(), Duration::from_millis(4 * 1500));

    let status = t.handle.status();
    assert_eq!(status.alive, AliveState::Dead);
    assert_eq!(status.unanswered_pings, 4);
    assert!(!status.socket_open);

    let mut pings = 0;
    while let Some(command) = peer.recv_command().await {
        assert_eq!(command.command, "ping");
        pings += 1;
    }
    assert_eq!(pings, 4);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_ready_timeout(#[from(link)] mut t: TestLink) {
    let start = Instant::now();
    let mut peer = t.peer().await;
    peer.expect_command("server_info").await;

    assert_eq!(t.events.recv().await, DEAD);
    assert_eq!(start.elapsed(), Duration::from_secs(5));
    assert!(peer.closed().await);
}

#[rstest]
#[case::never_accepts(MockMode::Hang)]
#[case::socket_cannot_be_created(MockMode::Invalid)]
#[tokio::test(start_paused = true)]
async fn test_connect_timeout(#[case] mode: MockMode) {
    let start = Instant::now();
    let mut t = spawn_link(mode, LinkOptions::default().connect_timeout(Duration::from_millis(50)));

    assert_eq!(t.events.recv().await, DEAD);
    assert_eq!(start.elapsed(), Duration::from_millis(50));
    assert!(!t.handle.status().socket_open);

    // Never alive, and nothing else is reported.
    assert_eq!(t.events.recv().await, None);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_refused_connection_is_immediate() {
    let start = Instant::now();
    let mut t = spawn_link(MockMode::Refuse, LinkOptions::default());

    assert_eq!(t.events.recv().await, DEAD);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[rstest]
#[case::closed(false)]
#[case::errored(true)]
#[tokio::test(start_paused = true)]
async fn test_transport_failure(#[from(link)] mut t: TestLink, #[case] error: bool) {
    let mut peer = t.alive_peer().await;
    let start = Instant::now();

    if error {
        peer.fail();
    } else {
        peer.close();
    }

    assert_eq!(t.events.recv().await, DEAD);
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert!(peer.closed().await);
    assert_eq!(t.events.recv().await, None);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_malformed_messages_are_ignored(#[from(link)] mut t: TestLink) {
    let mut peer = t.peer().await;
    let handshake = peer.expect_command("server_info").await;

    for text in ["", "garbage", "{}", "[]", "null", r#"{"type":"ledgerClosed","ledger_index":91000000}"#] {
        peer.send_raw(text);
    }
    peer.reply_server_info(&handshake);

    assert_eq!(t.events.recv().await, Some(LinkEvent { link: LinkId(0), alive: true }));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_pong_before_handshake(#[from(link)] mut t: TestLink) {
    let mut peer = t.peer().await;
    let handshake = peer.expect_command("server_info").await;
    let ping = peer.expect_command("ping").await;
    assert_eq!(t.handle.status().unanswered_pings, 1);

    let mut status = t.handle.subscribe();
    peer.reply_pong(&ping);
    let status = status.wait_for(|status| status.unanswered_pings == 0).await.unwrap().clone();
    assert_eq!(status.alive, AliveState::Unknown);

    peer.reply_server_info(&handshake);
    assert_eq!(t.events.recv().await, Some(LinkEvent { link: LinkId(0), alive: true }));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_send(#[from(link)] mut t: TestLink) {
    // The link task did not get to run yet.
    assert_matches!(t.handle.send(&Command::new("ledger")), Err(LinkError::NotConnected));

    let mut peer = t.alive_peer().await;
    let command = Command::new("ledger").with_id(1u64).with_param("ledger_index", "validated");
    t.handle.send(&command).unwrap();
    assert_eq!(peer.expect_command("ledger").await, command);

    t.handle.close();
    assert_eq!(t.events.recv().await, DEAD);
    assert_matches!(t.handle.send(&command), Err(LinkError::Closed));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_close_is_idempotent(#[from(link)] mut t: TestLink) {
    let mut peer = t.alive_peer().await;

    t.handle.close();
    t.handle.close();
    assert_eq!(t.events.recv().await, DEAD);
    // The link task has exited, and the dead link never reports anything again.
    assert_eq!(t.events.recv().await, None);
    assert!(peer.closed().await);

    t.handle.close();
    assert_eq!(t.handle.alive_state(), AliveState::Dead);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_close_before_connect() {
    let mut t = spawn_link(MockMode::Hang, LinkOptions::default());
    t.handle.close();

    assert_eq!(t.events.recv().await, DEAD);
    assert_eq!(t.events.recv().await, None);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_keepalive_on_closed_socket(#[from(link)] mut t: TestLink) {
    let opened = Instant::now();
    let mut peer = t.alive_peer().await;
    peer.stop_reading();

    assert_eq!(t.events.recv().await, DEAD);
    assert_eq!(opened.elapsed(), Duration::from_millis(1500));
    let status = t.handle.status();
    assert_eq!(status.alive, AliveState::Dead);
    // The ping could not be written, so it is not counted.
    assert_eq!(status.unanswered_pings, 0);
    assert!(!status.socket_open);

    // A single notification, and no timer of the link fires afterwards.
    assert_eq!(t.events.recv().await, None);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(t.handle.status(), status);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_dead_before_graceful_close() {
    let mut t = spawn_link(MockMode::AcceptSlowClose, LinkOptions::default());
    let peer = t.alive_peer().await;
    let start = Instant::now();
    peer.close();

    assert_eq!(t.events.recv().await, DEAD);
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert!(!t.handle.status().socket_open);
    assert_matches!(t.handle.send(&Command::new("ledger")), Err(LinkError::Closed));

    // The link task gives up on the close after a while.
    assert_eq!(t.events.recv().await, None);
    assert_eq!(start.elapsed(), Duration::from_secs(1));
}
