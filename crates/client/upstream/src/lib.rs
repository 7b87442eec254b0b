//! Uplink upstream pool. This crate keeps a set of live WebSocket connections to ledger nodes, categorized by
//! [`Role`], and heals the pool on its own when connections fail.
//!
//! # Overview
//!
//! - **[`link`]**: one managed connection. Handles the socket lifecycle, the `server_info` handshake and the
//!   keepalive `ping` loop, and reports alive state transitions.
//! - **[`UpstreamRegistry`]**: the pool. Detaches links as soon as they die, and resets the reconnection attempt
//!   count of an endpoint once a link to it completes its handshake.
//! - **[`ReconnectScheduler`]**: dials a detached endpoint again after a tiered backoff delay, see
//!   [`up_resilience::BackoffConfig`].
//!
//! # Failure detection
//!
//! Two independent detectors feed into the same path. The transport reports closures and errors, and the link
//! itself declares its peer dead when keepalive probes stay unanswered, since a WebSocket can stay technically open
//! while the peer has stopped servicing requests. Connect and handshake timeouts cover links which never became
//! alive. Whatever the cause, the link goes dead, the registry removes it and a reconnection is scheduled: failures
//! are never escalated past the registry.
//!
//! ```text
//! add ──▶ Link ──(alive: true)──▶ reset attempts
//!          │
//!          └──(alive: false)──▶ Registry: detach + attempts += 1 ──▶ Scheduler: sleep(backoff) ──▶ add
//! ```

pub mod error;
pub mod link;
pub mod protocol;
pub mod registry;
pub mod role;
pub mod scheduler;
pub mod snapshot;
pub mod transport;
mod util;

#[cfg(test)]
mod tests;

pub use error::{ConnectError, LinkError, TransportError, UnknownRole};
pub use link::{AliveState, LinkHandle, LinkId, LinkOptions, LinkStatus, Metadata};
pub use protocol::{Command, CommandId, CommandTag, Response, ServerInfo};
pub use registry::{PoolEvent, RegistryConfig, UpstreamRegistry};
pub use role::Role;
pub use scheduler::ReconnectScheduler;
pub use snapshot::{LinkReport, PoolReport};
pub use transport::{Connection, Connector, WsConnector};
pub use util::{service_state_channel, ServiceStateSender};
