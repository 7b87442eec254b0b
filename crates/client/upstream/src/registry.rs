use crate::{
    link::{AliveState, Link, LinkConfig, LinkEvent, LinkHandle, LinkId, LinkOptions, Metadata},
    role::Role,
    scheduler::{ReconnectScheduler, Removal},
    snapshot::{LinkReport, PoolReport},
    transport::Connector,
    util::ServiceStateSender,
};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, Weak,
    },
    time::Duration,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use up_resilience::{AttemptCounter, BackoffConfig};
use up_utils::AbortOnDrop;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    Added { link: LinkId, endpoint: String, role: Role },
    AliveChanged { link: LinkId, alive: bool },
    /// `attempt` is `None` for administrative removals, which do not count as a failure.
    Removed { link: LinkId, endpoint: String, role: Role, attempt: Option<u64> },
    ReconnectScheduled { endpoint: String, role: Role, attempt: u64, delay: Duration },
}

#[derive(Default)]
pub struct RegistryConfig {
    pub link_options: LinkOptions,
    pub backoff: BackoffConfig,
    /// Pool events observer, see [`crate::service_state_channel`].
    pub service_state_sender: ServiceStateSender<PoolEvent>,
}

impl RegistryConfig {
    pub fn link_options(self, link_options: LinkOptions) -> Self {
        Self { link_options, ..self }
    }
    pub fn backoff(self, backoff: BackoffConfig) -> Self {
        Self { backoff, ..self }
    }
    pub fn service_state_sender(self, service_state_sender: ServiceStateSender<PoolEvent>) -> Self {
        Self { service_state_sender, ..self }
    }
}

// Invariants:
// 1) every link in `upstreams` has an entry in `attempts`.
// 2) once `shut_down` is set, `upstreams` and `reconnects` stay empty.
// 3) a removal queued before `remove(endpoint)` carries an older generation than `generations[endpoint]`.
#[derive(Default)]
struct RegistryInner {
    upstreams: HashMap<Role, Vec<LinkHandle>>,
    attempts: AttemptCounter,
    /// Cancels the pending reconnections of an endpoint.
    reconnects: HashMap<String, CancellationToken>,
    /// Bumped by every administrative removal of an endpoint.
    generations: HashMap<String, u64>,
    shut_down: bool,
}

impl RegistryInner {
    fn generation(&self, endpoint: &str) -> u64 {
        self.generations.get(endpoint).copied().unwrap_or_default()
    }

    fn position(&self, link: LinkId) -> Option<(Role, usize)> {
        self.upstreams
            .iter()
            .find_map(|(role, links)| links.iter().position(|l| l.id() == link).map(|index| (*role, index)))
    }
}

/// Pool of upstream links, categorized by [`Role`].
///
/// A link that dies is detached from the pool right away and the [`ReconnectScheduler`] dials its endpoint again
/// after a backoff delay. The delay grows with the number of consecutive failures of the endpoint, and goes back to
/// the fastest tier as soon as a fresh link to it completes its handshake.
pub struct UpstreamRegistry {
    inner: Mutex<RegistryInner>,
    connector: Arc<dyn Connector>,
    link_options: LinkOptions,
    next_link_id: AtomicU64,
    link_events: mpsc::UnboundedSender<LinkEvent>,
    removals: mpsc::UnboundedSender<Removal>,
    service_state_sender: ServiceStateSender<PoolEvent>,
    cancel: CancellationToken,
    _tasks: [AbortOnDrop<()>; 2],
}

impl UpstreamRegistry {
    /// Creates the registry along with its event loop and its reconnection scheduler. Both tasks stop when the
    /// registry is dropped.
    pub fn start(config: RegistryConfig, connector: Arc<dyn Connector>) -> Arc<Self> {
        let RegistryConfig { link_options, backoff, service_state_sender } = config;
        let (link_events, link_events_recv) = mpsc::unbounded_channel();
        let (removals, removals_recv) = mpsc::unbounded_channel();

        Arc::new_cyclic(|registry: &Weak<Self>| {
            let event_loop = AbortOnDrop::spawn(Self::event_loop(registry.clone(), link_events_recv));
            let scheduler = ReconnectScheduler::new(registry.clone(), backoff, removals_recv);
            let scheduler = AbortOnDrop::spawn(scheduler.run());

            Self {
                inner: Mutex::new(RegistryInner::default()),
                connector,
                link_options,
                next_link_id: AtomicU64::new(0),
                link_events,
                removals,
                service_state_sender,
                cancel: CancellationToken::new(),
                _tasks: [event_loop, scheduler],
            }
        })
    }

    async fn event_loop(registry: Weak<Self>, mut events: mpsc::UnboundedReceiver<LinkEvent>) {
        while let Some(event) = events.recv().await {
            let Some(registry) = registry.upgrade() else { return };
            registry.handle_link_event(event);
        }
    }

    /// Adds a new link to the pool. Returns false once the registry has been shut down.
    pub fn add(&self, endpoint: impl Into<String>, role: Role, metadata: Metadata) -> bool {
        let endpoint = endpoint.into();
        let mut inner = self.inner.lock().expect("Poisoned lock");
        if inner.shut_down {
            tracing::debug!(endpoint = %endpoint, %role, "Registry is shut down, not adding upstream");
            return false;
        }

        inner.attempts.ensure(&endpoint);
        let id = LinkId(self.next_link_id.fetch_add(1, Ordering::Relaxed));
        let link = Link::spawn(
            LinkConfig { id, endpoint: endpoint.clone(), role, metadata, options: self.link_options },
            Arc::clone(&self.connector),
            self.link_events.clone(),
            self.cancel.child_token(),
        );
        // The link is registered before the lock is released: the event loop cannot observe one of its
        // notifications before that.
        inner.upstreams.entry(role).or_default().push(link);
        drop(inner);

        tracing::debug!(endpoint = %endpoint, %role, link = %id, "➕ Added upstream");
        self.service_state_sender.send(PoolEvent::Added { link: id, endpoint, role });
        true
    }

    /// Same as [`Self::add`], for a role given by name. Returns false on an unknown role.
    pub fn add_named(&self, endpoint: impl Into<String>, role: &str, metadata: Metadata) -> bool {
        let endpoint = endpoint.into();
        match role.parse::<Role>() {
            Ok(role) => self.add(endpoint, role, metadata),
            Err(err) => {
                tracing::warn!(endpoint = %endpoint, "Not adding upstream: {err}");
                false
            }
        }
    }

    pub(crate) fn handle_link_event(&self, event: LinkEvent) {
        let LinkEvent { link, alive } = event;
        let mut inner = self.inner.lock().expect("Poisoned lock");

        // Links which are not registered anymore have already been handled.
        let Some((role, index)) = inner.position(link) else { return };

        if alive {
            let endpoint = inner.upstreams[&role][index].endpoint().to_string();
            inner.attempts.reset(&endpoint);
            drop(inner);
            self.service_state_sender.send(PoolEvent::AliveChanged { link, alive });
            return;
        }

        let handle = inner.upstreams.get_mut(&role).map(|links| links.remove(index));
        let Some(handle) = handle else { return };
        let attempt = inner.attempts.increment(handle.endpoint());
        let generation = inner.generation(handle.endpoint());
        drop(inner);

        handle.close();
        tracing::debug!(endpoint = handle.endpoint(), %role, link = %link, attempt, "➖ Removed upstream");

        self.service_state_sender.send(PoolEvent::AliveChanged { link, alive });
        self.service_state_sender.send(PoolEvent::Removed {
            link,
            endpoint: handle.endpoint().to_string(),
            role,
            attempt: Some(attempt),
        });
        let _res = self.removals.send(Removal {
            endpoint: handle.endpoint().to_string(),
            role,
            metadata: handle.metadata().clone(),
            attempt,
            generation,
        });
    }

    /// Links of a role which are not dead. They may still be connecting.
    pub fn links(&self, role: Role) -> Vec<LinkHandle> {
        let inner = self.inner.lock().expect("Poisoned lock");
        inner
            .upstreams
            .get(&role)
            .map(|links| links.iter().filter(|link| link.alive_state() != AliveState::Dead).cloned().collect())
            .unwrap_or_default()
    }

    /// Links of a role which completed their handshake and answer pings.
    pub fn alive_links(&self, role: Role) -> Vec<LinkHandle> {
        self.links(role).into_iter().filter(LinkHandle::is_alive).collect()
    }

    pub fn attempts(&self, endpoint: &str) -> Option<u64> {
        self.inner.lock().expect("Poisoned lock").attempts.get(endpoint)
    }

    pub fn snapshot(&self) -> PoolReport {
        let inner = self.inner.lock().expect("Poisoned lock");
        let links = Role::ALL
            .iter()
            .filter_map(|role| inner.upstreams.get(role))
            .flatten()
            .map(LinkReport::from)
            .collect();
        PoolReport { attempts: inner.attempts.snapshot(), links }
    }

    /// Takes an endpoint out of rotation: closes its links and cancels its pending reconnections. This does not
    /// count as a failure of the endpoint. Returns the number of links closed.
    pub fn remove(&self, endpoint: &str) -> usize {
        let mut inner = self.inner.lock().expect("Poisoned lock");
        if let Some(token) = inner.reconnects.remove(endpoint) {
            token.cancel();
        }
        // Reconnections which are not scheduled yet are dropped as well.
        *inner.generations.entry(endpoint.to_string()).or_default() += 1;
        let mut removed = Vec::new();
        for links in inner.upstreams.values_mut() {
            let (matching, kept): (Vec<_>, Vec<_>) = links.drain(..).partition(|link| link.endpoint() == endpoint);
            *links = kept;
            removed.extend(matching);
        }
        drop(inner);

        for link in &removed {
            link.close();
            self.service_state_sender.send(PoolEvent::Removed {
                link: link.id(),
                endpoint: endpoint.to_string(),
                role: link.role(),
                attempt: None,
            });
        }
        tracing::info!(endpoint, links = removed.len(), "Upstream taken out of rotation");
        removed.len()
    }

    /// Closes every link and cancels every pending reconnection. Further calls to [`Self::add`] are rejected.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock().expect("Poisoned lock");
        if inner.shut_down {
            return;
        }
        inner.shut_down = true;
        let links: usize = inner.upstreams.drain().map(|(_, links)| links.len()).sum();
        inner.reconnects.clear();
        drop(inner);

        // Cancels the links and the reconnection timers.
        self.cancel.cancel();
        tracing::info!(links, "🔌 Upstream pool shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.lock().expect("Poisoned lock").shut_down
    }

    /// Token for a pending reconnection of `endpoint`, after a failure seen at `generation`. `None` once the
    /// registry is shut down or the endpoint has been removed since.
    pub(crate) fn reconnect_token(&self, endpoint: &str, generation: u64) -> Option<CancellationToken> {
        let mut inner = self.inner.lock().expect("Poisoned lock");
        if inner.shut_down || inner.generation(endpoint) != generation {
            return None;
        }
        let token =
            inner.reconnects.entry(endpoint.to_string()).or_insert_with(|| self.cancel.child_token()).child_token();
        Some(token)
    }

    pub(crate) fn notify(&self, event: PoolEvent) {
        self.service_state_sender.send(event);
    }
}

impl Drop for UpstreamRegistry {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
