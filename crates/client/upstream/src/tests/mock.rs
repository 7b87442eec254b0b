//! In-memory stand-in for the WebSocket transport. Every accepted connection is handed to the test as a
//! [`MockPeer`], which plays the remote ledger node.

use crate::{
    error::{ConnectError, TransportError},
    protocol::Command,
    transport::{Connection, Connector},
};
use futures::{channel::mpsc as fmpsc, Sink, SinkExt, StreamExt};
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    task::{Context, Poll},
};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockMode {
    /// Connect and hand the connection over to the test.
    Accept,
    /// Like `Accept`, but closing the link's side of the socket never completes.
    AcceptSlowClose,
    /// Never complete the connection.
    Hang,
    /// Fail like a socket that cannot even be created.
    Invalid,
    /// Fail like a refused connection.
    Refuse,
}

pub struct MockConnector {
    default_mode: MockMode,
    modes: Mutex<HashMap<String, MockMode>>,
    dials: AtomicUsize,
    peers: mpsc::UnboundedSender<MockPeer>,
}

impl MockConnector {
    pub fn new(default_mode: MockMode) -> (Self, mpsc::UnboundedReceiver<MockPeer>) {
        let (peers, peers_recv) = mpsc::unbounded_channel();
        (Self { default_mode, modes: Default::default(), dials: AtomicUsize::new(0), peers }, peers_recv)
    }

    pub fn set_mode(&self, endpoint: &str, mode: MockMode) {
        self.modes.lock().expect("Poisoned lock").insert(endpoint.to_string(), mode);
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    async fn connect(&self, endpoint: &str) -> Result<Connection, ConnectError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let mode = self.modes.lock().expect("Poisoned lock").get(endpoint).copied().unwrap_or(self.default_mode);
        match mode {
            MockMode::Accept | MockMode::AcceptSlowClose => {
                let (client_tx, server_rx) = fmpsc::unbounded::<String>();
                let (server_tx, client_rx) = fmpsc::unbounded::<Result<String, TransportError>>();
                let _res = self.peers.send(MockPeer {
                    endpoint: endpoint.to_string(),
                    incoming: server_rx,
                    outgoing: server_tx,
                });
                let sink = client_tx.sink_map_err(|_| TransportError::Closed);
                if mode == MockMode::AcceptSlowClose {
                    Ok(Connection::new(SlowClose(sink), client_rx))
                } else {
                    Ok(Connection::new(sink, client_rx))
                }
            }
            MockMode::Hang => std::future::pending().await,
            MockMode::Invalid => {
                Err(ConnectError::InvalidEndpoint { endpoint: endpoint.to_string(), reason: "mock".to_string() })
            }
            MockMode::Refuse => {
                Err(TransportError::Io(std::io::Error::from(std::io::ErrorKind::ConnectionRefused)).into())
            }
        }
    }
}

/// Forwards everything to the inner sink, except that closing never completes.
struct SlowClose<S>(S);

impl<S: Sink<String, Error = TransportError> + Unpin> Sink<String> for SlowClose<S> {
    type Error = TransportError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.0).poll_ready(cx)
    }
    fn start_send(mut self: Pin<&mut Self>, item: String) -> Result<(), Self::Error> {
        Pin::new(&mut self.0).start_send(item)
    }
    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }
    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Pending
    }
}

/// The remote side of a mock connection.
pub struct MockPeer {
    pub endpoint: String,
    incoming: fmpsc::UnboundedReceiver<String>,
    outgoing: fmpsc::UnboundedSender<Result<String, TransportError>>,
}

impl MockPeer {
    /// Next command sent by the link, `None` once the link closed its side.
    pub async fn recv_command(&mut self) -> Option<Command> {
        let text = self.incoming.next().await?;
        Some(serde_json::from_str(&text).expect("Link sent an invalid command"))
    }

    /// Skips commands until one named `name` arrives.
    pub async fn expect_command(&mut self, name: &str) -> Command {
        loop {
            let command = self.recv_command().await.expect("Link closed the connection");
            if command.command == name {
                return command;
            }
        }
    }

    pub fn send_raw(&self, text: &str) {
        let _res = self.outgoing.unbounded_send(Ok(text.to_string()));
    }

    pub fn send_json(&self, value: Value) {
        self.send_raw(&value.to_string());
    }

    pub fn reply_server_info(&self, command: &Command) {
        self.send_json(server_info_response(command, "2.3.0"));
    }

    pub fn reply_pong(&self, command: &Command) {
        self.send_json(json!({ "id": command.id, "result": {}, "status": "success", "type": "response" }));
    }

    pub fn fail(&self) {
        let _res = self.outgoing.unbounded_send(Err(TransportError::Closed));
    }

    /// Ends the inbound stream of the link, like a socket closed by the remote.
    pub fn close(&self) {
        self.outgoing.close_channel();
    }

    /// Stops reading from the socket: every further send of the link fails.
    pub fn stop_reading(&mut self) {
        self.incoming.close();
    }

    /// Whether the link closed its side of the connection.
    pub async fn closed(&mut self) -> bool {
        while self.incoming.next().await.is_some() {}
        true
    }
}

pub fn server_info_response(command: &Command, build_version: &str) -> Value {
    json!({
        "id": command.id,
        "status": "success",
        "type": "response",
        "result": { "info": {
            "build_version": build_version,
            "hostid": "ANVIL",
            "network_id": 0,
            "complete_ledgers": "32570-91000000",
            "server_state": "full"
        }}
    })
}
