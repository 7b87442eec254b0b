//! A single managed connection to an upstream node.
//!
//! Each link is driven by its own task, which owns the socket halves and every timer of the link:
//!
//! - **connect timeout**: armed on spawn, the socket must open before it fires.
//! - **ready timeout**: armed once the socket is open, a `server_info` handshake response must arrive before it
//!   fires.
//! - **keepalive**: a `ping` every [`LinkOptions::keepalive_interval`] while the socket is open. The peer is declared
//!   dead once more than [`MAX_UNANSWERED_PINGS`] probes are left unanswered, even if the transport never reports
//!   a closure.
//!
//! Timers are plain futures polled by the driver loop: once the loop exits, none of them can fire anymore. Every
//! exit path ends in the same teardown, which reports the link dead before the socket is closed.
//!
//! The registry learns about alive state changes through [`LinkEvent`]s, sent once per observable transition.

use crate::{
    error::{ConnectError, LinkError},
    protocol::{Command, Response},
    role::Role,
    transport::{Connection, Connector},
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, watch},
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use up_utils::fmt_option;

mod state;

pub use state::{AliveState, Inbound, LinkState, MAX_UNANSWERED_PINGS};

/// Opaque key-value bag attached to a link, passed through unchanged.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Upper bound on a graceful socket close during teardown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(pub u64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkOptions {
    pub connect_timeout: Duration,
    pub ready_timeout: Duration,
    pub keepalive_interval: Duration,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(5000),
            ready_timeout: Duration::from_millis(5000),
            keepalive_interval: Duration::from_millis(1500),
        }
    }
}

impl LinkOptions {
    pub fn connect_timeout(self, connect_timeout: Duration) -> Self {
        Self { connect_timeout, ..self }
    }
    pub fn ready_timeout(self, ready_timeout: Duration) -> Self {
        Self { ready_timeout, ..self }
    }
    pub fn keepalive_interval(self, keepalive_interval: Duration) -> Self {
        Self { keepalive_interval, ..self }
    }
}

/// Alive state notification, sent by a link to its subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkEvent {
    pub link: LinkId,
    pub alive: bool,
}

/// Snapshot of a link, published by the driver on every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkStatus {
    pub alive: AliveState,
    pub unanswered_pings: u32,
    pub socket_open: bool,
    pub server_info: Option<crate::protocol::ServerInfo>,
}

pub struct LinkConfig {
    pub id: LinkId,
    pub endpoint: String,
    pub role: Role,
    pub metadata: Metadata,
    pub options: LinkOptions,
}

/// Cheap handle to a running link.
#[derive(Debug, Clone)]
pub struct LinkHandle {
    inner: Arc<LinkShared>,
}

#[derive(Debug)]
struct LinkShared {
    id: LinkId,
    endpoint: String,
    role: Role,
    metadata: Metadata,
    status: watch::Receiver<LinkStatus>,
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

impl LinkHandle {
    pub fn id(&self) -> LinkId {
        self.inner.id
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    pub fn role(&self) -> Role {
        self.inner.role
    }

    pub fn metadata(&self) -> &Metadata {
        &self.inner.metadata
    }

    pub fn status(&self) -> LinkStatus {
        self.inner.status.borrow().clone()
    }

    /// Watch the link status. The channel closes once the link task has exited.
    pub fn subscribe(&self) -> watch::Receiver<LinkStatus> {
        self.inner.status.clone()
    }

    pub fn alive_state(&self) -> AliveState {
        self.inner.status.borrow().alive
    }

    pub fn is_alive(&self) -> bool {
        self.alive_state() == AliveState::Alive
    }

    /// Tears the link down. Idempotent, safe to call before the socket is open.
    pub fn close(&self) {
        self.inner.cancel.cancel();
    }

    /// Queues a command on the socket. The response arrives like any other inbound message.
    pub fn send(&self, command: &Command) -> Result<(), LinkError> {
        {
            let status = self.inner.status.borrow();
            if self.inner.cancel.is_cancelled() || status.alive == AliveState::Dead {
                return Err(LinkError::Closed);
            }
            if !status.socket_open {
                return Err(LinkError::NotConnected);
            }
        }
        let text = command.to_json()?;
        self.inner.outbound.send(text).map_err(|_| LinkError::Closed)
    }
}

/// Link driver, see the [module documentation](self).
pub struct Link {
    handle: LinkHandle,
    options: LinkOptions,
    connector: Arc<dyn Connector>,
    events: mpsc::UnboundedSender<LinkEvent>,
    status: watch::Sender<LinkStatus>,
    state: LinkState,
    socket_open: bool,
}

impl Link {
    /// Spawns the link task. The link stops once `cancel` is cancelled or any of its failure detectors fires.
    pub fn spawn(
        config: LinkConfig,
        connector: Arc<dyn Connector>,
        events: mpsc::UnboundedSender<LinkEvent>,
        cancel: CancellationToken,
    ) -> LinkHandle {
        let LinkConfig { id, endpoint, role, metadata, options } = config;
        let (status, status_recv) = watch::channel(LinkStatus::default());
        let (outbound, outbound_recv) = mpsc::unbounded_channel();

        let handle = LinkHandle {
            inner: Arc::new(LinkShared { id, endpoint, role, metadata, status: status_recv, outbound, cancel }),
        };
        let link = Self {
            handle: handle.clone(),
            options,
            connector,
            events,
            status,
            state: LinkState::new(),
            socket_open: false,
        };
        tokio::spawn(link.run(outbound_recv));

        handle
    }

    fn endpoint(&self) -> &str {
        self.handle.endpoint()
    }

    async fn run(mut self, mut outbound: mpsc::UnboundedReceiver<String>) {
        let cancel = self.handle.inner.cancel.clone();
        let connect_deadline = Instant::now() + self.options.connect_timeout;

        let connection = tokio::select! {
            _ = cancel.cancelled() => None,
            _ = tokio::time::sleep_until(connect_deadline) => {
                tracing::warn!(endpoint = self.endpoint(), role = %self.handle.role(), "⏳ Connect timeout");
                None
            }
            connection = self.connect() => connection,
        };

        if let Some(connection) = connection {
            self.run_open(connection, &mut outbound, &cancel).await;
        }

        self.teardown();
    }

    async fn connect(&self) -> Option<Connection> {
        match self.connector.connect(self.endpoint()).await {
            Ok(connection) => Some(connection),
            Err(err @ ConnectError::InvalidEndpoint { .. }) => {
                // Left to the connect timeout.
                tracing::warn!(endpoint = self.endpoint(), "Could not create upstream socket: {err}");
                std::future::pending().await
            }
            Err(err) => {
                tracing::warn!(endpoint = self.endpoint(), "Upstream connection failed: {err}");
                None
            }
        }
    }

    async fn run_open(
        &mut self,
        connection: Connection,
        outbound: &mut mpsc::UnboundedReceiver<String>,
        cancel: &CancellationToken,
    ) {
        let Connection { mut sink, mut stream } = connection;
        tracing::debug!(endpoint = self.endpoint(), "🔗 Socket open");
        self.socket_open = true;
        self.publish_status();

        let now = Instant::now();
        let mut ready_deadline = Some(now + self.options.ready_timeout);
        let mut keepalive =
            tokio::time::interval_at(now + self.options.keepalive_interval, self.options.keepalive_interval);
        keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        if let Err(err) = self.send_command(&mut sink, &Command::server_info()).await {
            tracing::warn!(endpoint = self.endpoint(), "Could not send handshake: {err}");
            self.teardown();
            return self.close_sink(sink).await;
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep_until(ready_deadline.unwrap_or(now)), if ready_deadline.is_some() => {
                    tracing::warn!(
                        endpoint = self.endpoint(),
                        role = %self.handle.role(),
                        "⏳ No handshake response before ready timeout"
                    );
                    break;
                }
                _ = keepalive.tick() => {
                    if let Err(err) = self.send_command(&mut sink, &Command::ping()).await {
                        tracing::debug!(endpoint = self.endpoint(), "Socket no longer open: {err}");
                        break;
                    }
                    let before = self.state.alive();
                    let transition = self.state.on_keepalive_sent();
                    self.publish_status();
                    if transition.is_some() {
                        tracing::warn!(
                            endpoint = self.endpoint(),
                            unanswered_pings = self.state.unanswered_pings(),
                            "💤 Upstream stopped answering pings"
                        );
                        self.emit(before, transition);
                        break;
                    }
                }
                Some(text) = outbound.recv() => {
                    if let Err(err) = sink.send(text).await {
                        tracing::debug!(endpoint = self.endpoint(), "Socket no longer open: {err}");
                        break;
                    }
                }
                message = stream.next() => match message {
                    Some(Ok(text)) => {
                        if self.handle_message(&text) {
                            ready_deadline = None;
                        }
                    }
                    Some(Err(err)) => {
                        tracing::debug!(endpoint = self.endpoint(), "Socket error: {err}");
                        break;
                    }
                    None => {
                        tracing::debug!(endpoint = self.endpoint(), "Socket closed by peer");
                        break;
                    }
                },
            }
        }

        // Reported dead before the graceful close, which can take up to `CLOSE_TIMEOUT`.
        self.teardown();
        self.close_sink(sink).await
    }

    /// Returns true once the link is ready, meaning the ready timeout is no longer needed.
    fn handle_message(&mut self, text: &str) -> bool {
        let Some(response) = Response::parse(text) else {
            tracing::trace!(endpoint = self.endpoint(), "Ignoring malformed message");
            return false;
        };
        if !response.is_suppressed() {
            tracing::debug!(endpoint = self.endpoint(), "📥 {text}");
        }

        let before = self.state.alive();
        let inbound = self.state.on_response(&response);

        if let (Inbound::ServerInfo { first: true, .. }, Some(info)) = (inbound, self.state.server_info()) {
            tracing::info!(
                endpoint = self.endpoint(),
                role = %self.handle.role(),
                hostid = %fmt_option(info.hostid.as_deref(), "?"),
                network_id = %fmt_option(info.network_id, "?"),
                build_version = %info.build_version,
                complete_ledgers = %fmt_option(info.complete_ledgers.as_deref(), "empty"),
                "🤝 Upstream handshake"
            );
        }

        self.publish_status();
        self.emit(before, inbound.transition());
        self.state.alive() == AliveState::Alive
    }

    async fn send_command(&self, sink: &mut crate::transport::BoxSink, command: &Command) -> anyhow::Result<()> {
        sink.send(command.to_json()?).await?;
        Ok(())
    }

    async fn close_sink(&self, mut sink: crate::transport::BoxSink) {
        if tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await.is_err() {
            tracing::debug!(endpoint = self.endpoint(), "Socket close timed out");
        }
    }

    /// Marks the link dead and reports it. Idempotent.
    fn teardown(&mut self) {
        self.socket_open = false;
        let before = self.state.alive();
        let transition = self.state.close();
        self.emit(before, transition);
        self.publish_status();
        self.handle.close();
    }

    fn emit(&self, before: AliveState, transition: Option<bool>) {
        let Some(alive) = transition else { return };
        tracing::info!(
            target: "upstream_state",
            endpoint = self.endpoint(),
            role = %self.handle.role(),
            from = %before,
            to = %self.state.alive(),
            "{}",
            if alive { "Upstream is alive" } else { "Upstream is dead" }
        );
        let _res = self.events.send(LinkEvent { link: self.handle.id(), alive });
    }

    fn publish_status(&self) {
        self.status.send_replace(LinkStatus {
            alive: self.state.alive(),
            unanswered_pings: self.state.unanswered_pings(),
            socket_open: self.socket_open,
            server_info: self.state.server_info().cloned(),
        });
    }
}
