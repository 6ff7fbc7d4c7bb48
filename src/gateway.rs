//! Broadcast gateway between the real-time transport and the context registry.
//!
//! The transport owns connections and group membership; the gateway keeps the
//! registry's subscriber counts in step with subscribe, unsubscribe, and
//! disconnect events and pushes named events to context groups.

use crate::error::TransportError;
use crate::registry::ContextRegistry;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const SUBSCRIBED_EVENT: &str = "Subscribed";
pub const UNSUBSCRIBED_EVENT: &str = "Unsubscribed";
pub const CONTEXTS_EVENT: &str = "Contexts";

/// Group messaging primitives of the real-time transport.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    async fn add_to_group(&self, connection_id: &str, group: &str) -> Result<(), TransportError>;

    async fn remove_from_group(
        &self,
        connection_id: &str,
        group: &str,
    ) -> Result<(), TransportError>;

    /// Send an event to one connection only.
    async fn send_to_caller(
        &self,
        connection_id: &str,
        event: &str,
        payload: Arc<Value>,
    ) -> Result<(), TransportError>;

    /// Send an event to every member of a group. Returns how many members
    /// the event was delivered to.
    async fn send_to_group(
        &self,
        group: &str,
        event: &str,
        payload: Arc<Value>,
    ) -> Result<usize, TransportError>;
}

/// Bridges subscriber lifecycle events to the registry and the transport.
pub struct BroadcastGateway<T> {
    transport: Arc<T>,
    registry: Arc<ContextRegistry>,
    track_dynamic_contexts: bool,
    connections: Mutex<Connections>,
}

#[derive(Default)]
struct Connections {
    next_generation: u64,
    live: HashMap<String, ConnectionState>,
}

impl Connections {
    /// Live state of a connection, if it is still the same connection that
    /// was seen at `generation`.
    fn current(&mut self, connection_id: &str, generation: u64) -> Option<&mut ConnectionState> {
        self.live
            .get_mut(connection_id)
            .filter(|state| state.generation == generation)
    }
}

struct ConnectionState {
    generation: u64,
    /// Contexts this connection is counted in (case-folded)
    contexts: HashSet<String>,
}

impl<T: RealtimeTransport> BroadcastGateway<T> {
    pub fn new(
        transport: Arc<T>,
        registry: Arc<ContextRegistry>,
        track_dynamic_contexts: bool,
    ) -> Self {
        Self {
            transport,
            registry,
            track_dynamic_contexts,
            connections: Mutex::new(Connections::default()),
        }
    }

    pub fn registry(&self) -> &Arc<ContextRegistry> {
        &self.registry
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Whether subscriber counts are kept in the registry.
    pub fn tracks_contexts(&self) -> bool {
        self.track_dynamic_contexts
    }

    /// Start tracking a connection. Subscriptions are only accepted from
    /// connections opened here.
    pub fn on_connect(&self, connection_id: &str) {
        let mut connections = self.connections.lock();
        let generation = connections.next_generation;
        connections.next_generation += 1;
        connections
            .live
            .entry(connection_id.to_string())
            .or_insert_with(|| ConnectionState {
                generation,
                contexts: HashSet::new(),
            });
        debug!(connection = %connection_id, "Connection opened");
    }

    /// Forget a connection and release every subscription it still held.
    pub fn on_disconnect(&self, connection_id: &str, cause: Option<&str>) {
        let held = self
            .connections
            .lock()
            .live
            .remove(connection_id)
            .map(|state| state.contexts)
            .unwrap_or_default();

        if self.track_dynamic_contexts {
            for context in &held {
                self.registry.decrement(context);
            }
        }

        match cause {
            Some(cause) => info!(
                connection = %connection_id,
                released = held.len(),
                cause = %cause,
                "Connection closed with error"
            ),
            None => debug!(
                connection = %connection_id,
                released = held.len(),
                "Connection closed"
            ),
        }
    }

    /// Subscribe a connection to a context and confirm to the caller.
    ///
    /// Subscribing twice to the same context counts once, so clients may
    /// simply re-subscribe after a transport failure. A connection that
    /// closes while the group join is in flight is never counted.
    pub async fn on_subscribe(
        &self,
        connection_id: &str,
        context: &str,
    ) -> Result<(), TransportError> {
        let generation = self
            .connections
            .lock()
            .live
            .get(connection_id)
            .map(|state| state.generation)
            .ok_or_else(|| TransportError::UnknownConnection(connection_id.to_string()))?;

        if let Err(e) = self.transport.add_to_group(connection_id, context).await {
            warn!(connection = %connection_id, context = %context, error = %e, "Failed to join group");
            return Err(e);
        }

        // Counted under the connection lock so a concurrent disconnect either
        // sees this subscription or prevents it
        let count = self
            .connections
            .lock()
            .current(connection_id, generation)
            .map(|state| self.count_subscription(state, context));

        let Some(count) = count else {
            debug!(connection = %connection_id, context = %context, "Connection closed during subscribe");
            if let Err(e) = self.transport.remove_from_group(connection_id, context).await {
                warn!(connection = %connection_id, context = %context, error = %e, "Failed to leave group");
            }
            return Err(TransportError::UnknownConnection(connection_id.to_string()));
        };

        debug!(connection = %connection_id, context = %context, ?count, "Subscribed");
        self.confirm(connection_id, SUBSCRIBED_EVENT, context, count)
            .await
    }

    /// Record a subscription and return the context's subscriber count.
    fn count_subscription(&self, state: &mut ConnectionState, context: &str) -> Option<u64> {
        let key = context.to_lowercase();
        if !self.track_dynamic_contexts {
            state.contexts.insert(key);
            return None;
        }
        if state.contexts.contains(&key) {
            return self.registry.get(context).map(|e| e.connection_count);
        }

        // Creates the context on demand unless the registry ignores unknown names
        let count = self.registry.increment(context);
        // Only what was counted is released later
        if count.is_some() {
            state.contexts.insert(key);
        }
        count
    }

    /// Unsubscribe a connection from a context and confirm to the caller.
    pub async fn on_unsubscribe(
        &self,
        connection_id: &str,
        context: &str,
    ) -> Result<(), TransportError> {
        if let Err(e) = self
            .transport
            .remove_from_group(connection_id, context)
            .await
        {
            warn!(connection = %connection_id, context = %context, error = %e, "Failed to leave group");
            return Err(e);
        }

        let was_subscribed = self
            .connections
            .lock()
            .live
            .get_mut(connection_id)
            .map(|state| state.contexts.remove(&context.to_lowercase()))
            .unwrap_or(false);

        let count = if self.track_dynamic_contexts && was_subscribed {
            self.registry.decrement(context)
        } else if self.track_dynamic_contexts {
            self.registry.get(context).map(|e| e.connection_count)
        } else {
            None
        };

        debug!(connection = %connection_id, context = %context, ?count, "Unsubscribed");
        self.confirm(connection_id, UNSUBSCRIBED_EVENT, context, count)
            .await
    }

    /// Push an event to every subscriber of a context.
    pub async fn broadcast(
        &self,
        context: &str,
        event: &str,
        payload: Value,
    ) -> Result<usize, TransportError> {
        let delivered = self
            .transport
            .send_to_group(context, event, Arc::new(payload))
            .await
            .map_err(|e| {
                warn!(context = %context, event = %event, error = %e, "Broadcast failed");
                e
            })?;

        debug!(context = %context, event = %event, delivered, "Broadcast sent");
        Ok(delivered)
    }

    /// Send the active context list to one connection and return it.
    pub async fn query_contexts(&self, connection_id: &str) -> Result<Vec<String>, TransportError> {
        let contexts = self.registry.list_active();
        self.transport
            .send_to_caller(connection_id, CONTEXTS_EVENT, Arc::new(json!(contexts)))
            .await
            .map_err(|e| {
                warn!(connection = %connection_id, error = %e, "Failed to send context list");
                e
            })?;
        Ok(contexts)
    }

    /// Contexts a connection is currently subscribed to (case-folded, sorted).
    pub fn subscriptions_of(&self, connection_id: &str) -> Vec<String> {
        let mut held: Vec<_> = self
            .connections
            .lock()
            .live
            .get(connection_id)
            .map(|state| state.contexts.iter().cloned().collect())
            .unwrap_or_default();
        held.sort();
        held
    }

    async fn confirm(
        &self,
        connection_id: &str,
        event: &str,
        context: &str,
        count: Option<u64>,
    ) -> Result<(), TransportError> {
        let payload = json!({ "context": context, "connectionCount": count });
        self.transport
            .send_to_caller(connection_id, event, Arc::new(payload))
            .await
            .map_err(|e| {
                warn!(connection = %connection_id, event = %event, error = %e, "Failed to confirm");
                e
            })
    }
}

/// An event delivered to one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub event: String,
    pub payload: Arc<Value>,
}

/// In-process transport backed by one bounded channel per connection.
///
/// Group sends fan out explicitly: each member gets its own non-blocking send,
/// so a full or closed connection never holds up the others.
pub struct ChannelTransport {
    capacity: usize,
    connections: RwLock<HashMap<String, mpsc::Sender<Delivery>>>,
    groups: RwLock<HashMap<String, BTreeSet<String>>>,
}

impl ChannelTransport {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            connections: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
        }
    }

    /// Open a connection and return the receiving end of its event stream.
    pub fn connect(&self, connection_id: &str) -> mpsc::Receiver<Delivery> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.connections.write().insert(connection_id.to_string(), tx);
        rx
    }

    /// Close a connection and drop it from every group.
    pub fn disconnect(&self, connection_id: &str) {
        self.connections.write().remove(connection_id);
        let mut groups = self.groups.write();
        groups.retain(|_, members| {
            members.remove(connection_id);
            !members.is_empty()
        });
    }

    /// Members of a group, sorted.
    pub fn members(&self, group: &str) -> Vec<String> {
        self.groups
            .read()
            .get(&group.to_lowercase())
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn sender(&self, connection_id: &str) -> Result<mpsc::Sender<Delivery>, TransportError> {
        self.connections
            .read()
            .get(connection_id)
            .cloned()
            .ok_or_else(|| TransportError::UnknownConnection(connection_id.to_string()))
    }

    fn deliver(
        connection_id: &str,
        tx: &mpsc::Sender<Delivery>,
        delivery: Delivery,
    ) -> Result<(), TransportError> {
        tx.try_send(delivery).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                TransportError::BufferFull(connection_id.to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                TransportError::ConnectionClosed(connection_id.to_string())
            }
        })
    }
}

impl Default for ChannelTransport {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl RealtimeTransport for ChannelTransport {
    async fn add_to_group(&self, connection_id: &str, group: &str) -> Result<(), TransportError> {
        self.sender(connection_id)?;
        self.groups
            .write()
            .entry(group.to_lowercase())
            .or_default()
            .insert(connection_id.to_string());
        Ok(())
    }

    async fn remove_from_group(
        &self,
        connection_id: &str,
        group: &str,
    ) -> Result<(), TransportError> {
        let mut groups = self.groups.write();
        let key = group.to_lowercase();
        if let Some(members) = groups.get_mut(&key) {
            members.remove(connection_id);
            if members.is_empty() {
                groups.remove(&key);
            }
        }
        Ok(())
    }

    async fn send_to_caller(
        &self,
        connection_id: &str,
        event: &str,
        payload: Arc<Value>,
    ) -> Result<(), TransportError> {
        let tx = self.sender(connection_id)?;
        Self::deliver(
            connection_id,
            &tx,
            Delivery {
                event: event.to_string(),
                payload,
            },
        )
    }

    async fn send_to_group(
        &self,
        group: &str,
        event: &str,
        payload: Arc<Value>,
    ) -> Result<usize, TransportError> {
        // Snapshot the targets so no lock is held while sending
        let targets: Vec<(String, mpsc::Sender<Delivery>)> = {
            let groups = self.groups.read();
            let connections = self.connections.read();
            groups
                .get(&group.to_lowercase())
                .map(|members| {
                    members
                        .iter()
                        .filter_map(|id| connections.get(id).map(|tx| (id.clone(), tx.clone())))
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut delivered = 0;
        for (id, tx) in &targets {
            let delivery = Delivery {
                event: event.to_string(),
                payload: Arc::clone(&payload),
            };
            match Self::deliver(id, tx, delivery) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(group = %group, error = %e, "Dropped event for subscriber"),
            }
        }
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ContextOrigin, UnknownContextPolicy};
    use tokio::sync::Notify;

    fn setup(track: bool) -> (Arc<ChannelTransport>, BroadcastGateway<ChannelTransport>) {
        let transport = Arc::new(ChannelTransport::new(16));
        let registry = Arc::new(ContextRegistry::with_static(
            UnknownContextPolicy::CreateOnDemand,
            [("stocks", true)],
        ));
        let gateway = BroadcastGateway::new(Arc::clone(&transport), registry, track);
        (transport, gateway)
    }

    fn open(
        transport: &ChannelTransport,
        gateway: &BroadcastGateway<ChannelTransport>,
        connection_id: &str,
    ) -> mpsc::Receiver<Delivery> {
        let rx = transport.connect(connection_id);
        gateway.on_connect(connection_id);
        rx
    }

    fn count(gateway: &BroadcastGateway<ChannelTransport>, name: &str) -> u64 {
        gateway.registry().get(name).unwrap().connection_count
    }

    #[tokio::test]
    async fn test_subscribe_confirms_to_caller_only() {
        let (transport, gateway) = setup(true);
        let mut alice = open(&transport, &gateway, "alice");
        let mut bob = open(&transport, &gateway, "bob");

        gateway.on_subscribe("alice", "stocks").await.unwrap();

        let confirmation = alice.recv().await.unwrap();
        assert_eq!(confirmation.event, SUBSCRIBED_EVENT);
        assert_eq!(confirmation.payload["context"], "stocks");
        assert_eq!(confirmation.payload["connectionCount"], 1);
        assert!(bob.try_recv().is_err());
        assert_eq!(transport.members("stocks"), vec!["alice"]);
    }

    #[tokio::test]
    async fn test_dynamic_context_created_on_subscribe() {
        let (transport, gateway) = setup(true);
        let _rx = open(&transport, &gateway, "c1");

        gateway.on_subscribe("c1", "weather").await.unwrap();

        let entry = gateway.registry().get("weather").unwrap();
        assert_eq!(entry.origin, ContextOrigin::Dynamic);
        assert_eq!(entry.connection_count, 1);
    }

    #[tokio::test]
    async fn test_resubscribe_counts_once() {
        let (transport, gateway) = setup(true);
        let _rx = open(&transport, &gateway, "c1");

        gateway.on_subscribe("c1", "stocks").await.unwrap();
        gateway.on_subscribe("c1", "STOCKS").await.unwrap();
        assert_eq!(count(&gateway, "stocks"), 1);

        gateway.on_unsubscribe("c1", "stocks").await.unwrap();
        gateway.on_unsubscribe("c1", "stocks").await.unwrap();
        assert_eq!(count(&gateway, "stocks"), 0);
        assert!(transport.members("stocks").is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_releases_subscriptions() {
        let (transport, gateway) = setup(true);
        let _a = open(&transport, &gateway, "a");
        let _b = open(&transport, &gateway, "b");

        gateway.on_subscribe("a", "stocks").await.unwrap();
        gateway.on_subscribe("a", "weather").await.unwrap();
        gateway.on_subscribe("b", "stocks").await.unwrap();
        assert_eq!(gateway.subscriptions_of("a"), vec!["stocks", "weather"]);

        gateway.on_disconnect("a", Some("socket reset"));
        transport.disconnect("a");

        assert_eq!(count(&gateway, "stocks"), 1);
        assert_eq!(count(&gateway, "weather"), 0);
        assert!(gateway.subscriptions_of("a").is_empty());
        assert_eq!(transport.members("stocks"), vec!["b"]);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_group_in_order() {
        let (transport, gateway) = setup(true);
        let mut a = open(&transport, &gateway, "a");
        let mut b = open(&transport, &gateway, "b");
        let mut outsider = open(&transport, &gateway, "c");
        gateway.on_subscribe("a", "stocks").await.unwrap();
        gateway.on_subscribe("b", "Stocks").await.unwrap();
        a.recv().await.unwrap();
        b.recv().await.unwrap();

        for seq in 0..3 {
            let delivered = gateway
                .broadcast("stocks", "data", json!({ "seq": seq }))
                .await
                .unwrap();
            assert_eq!(delivered, 2);
        }

        for rx in [&mut a, &mut b] {
            for seq in 0..3 {
                let delivery = rx.recv().await.unwrap();
                assert_eq!(delivery.event, "data");
                assert_eq!(delivery.payload["seq"], seq);
            }
        }
        assert!(outsider.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_subscriber_does_not_block_others() {
        let (transport, gateway) = setup(true);
        let closed = open(&transport, &gateway, "gone");
        let mut alive = open(&transport, &gateway, "alive");
        gateway.on_subscribe("gone", "stocks").await.unwrap();
        gateway.on_subscribe("alive", "stocks").await.unwrap();
        drop(closed);
        alive.recv().await.unwrap();

        let delivered = gateway.broadcast("stocks", "data", json!(1)).await.unwrap();

        assert_eq!(delivered, 1);
        assert_eq!(alive.recv().await.unwrap().payload.as_ref(), &json!(1));
    }

    #[tokio::test]
    async fn test_subscribe_unknown_connection_fails_without_counting() {
        let (_transport, gateway) = setup(true);

        let err = gateway.on_subscribe("ghost", "stocks").await.unwrap_err();

        assert_eq!(err, TransportError::UnknownConnection("ghost".to_string()));
        assert_eq!(count(&gateway, "stocks"), 0);
    }

    #[tokio::test]
    async fn test_tracking_disabled_leaves_registry_alone() {
        let (transport, gateway) = setup(false);
        let mut rx = open(&transport, &gateway, "c1");

        gateway.on_subscribe("c1", "weather").await.unwrap();

        assert!(!gateway.registry().exists("weather"));
        assert_eq!(transport.members("weather"), vec!["c1"]);
        assert!(rx.recv().await.unwrap().payload["connectionCount"].is_null());
    }

    #[tokio::test]
    async fn test_query_contexts() {
        let (transport, gateway) = setup(true);
        let mut rx = open(&transport, &gateway, "c1");
        gateway.registry().ensure("weather");
        gateway.registry().ensure("hidden");
        gateway.registry().set_active("hidden", false);

        let contexts = gateway.query_contexts("c1").await.unwrap();

        assert_eq!(contexts, vec!["stocks", "weather"]);
        let delivery = rx.recv().await.unwrap();
        assert_eq!(delivery.event, CONTEXTS_EVENT);
        assert_eq!(delivery.payload.as_ref(), &json!(["stocks", "weather"]));
    }

    #[tokio::test]
    async fn test_concurrent_subscribers_are_all_counted() {
        let (transport, gateway) = setup(true);
        let gateway = Arc::new(gateway);
        let mut receivers = Vec::new();
        for i in 0..32 {
            receivers.push(open(&transport, &gateway, &format!("c{i}")));
        }

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let gateway = Arc::clone(&gateway);
                tokio::spawn(async move { gateway.on_subscribe(&format!("c{i}"), "stocks").await })
            })
            .collect();
        for task in tasks {
            tokio_test::assert_ok!(task.await.unwrap());
        }

        assert_eq!(count(&gateway, "stocks"), 32);
    }

    #[tokio::test]
    async fn test_unsubscribe_confirms_to_caller_only() {
        let (transport, gateway) = setup(true);
        let mut alice = open(&transport, &gateway, "alice");
        let mut bob = open(&transport, &gateway, "bob");
        gateway.on_subscribe("alice", "stocks").await.unwrap();
        gateway.on_subscribe("bob", "stocks").await.unwrap();
        alice.recv().await.unwrap();
        bob.recv().await.unwrap();

        gateway.on_unsubscribe("alice", "Stocks").await.unwrap();

        let confirmation = alice.recv().await.unwrap();
        assert_eq!(confirmation.event, UNSUBSCRIBED_EVENT);
        assert_eq!(confirmation.payload["context"], "Stocks");
        assert_eq!(confirmation.payload["connectionCount"], 1);
        assert!(bob.try_recv().is_err());
        assert_eq!(transport.members("stocks"), vec!["bob"]);
    }

    #[tokio::test]
    async fn test_ignored_subscription_never_released() {
        let transport = Arc::new(ChannelTransport::new(16));
        let registry = Arc::new(ContextRegistry::new(UnknownContextPolicy::Ignore));
        let gateway = BroadcastGateway::new(Arc::clone(&transport), Arc::clone(&registry), true);
        let mut early = open(&transport, &gateway, "early");
        let _late = open(&transport, &gateway, "late");

        gateway.on_subscribe("early", "weather").await.unwrap();
        assert!(early.recv().await.unwrap().payload["connectionCount"].is_null());
        assert!(gateway.subscriptions_of("early").is_empty());

        registry.ensure("weather");
        gateway.on_subscribe("late", "weather").await.unwrap();
        assert_eq!(count(&gateway, "weather"), 1);

        gateway.on_unsubscribe("early", "weather").await.unwrap();
        gateway.on_disconnect("early", None);
        assert_eq!(count(&gateway, "weather"), 1);
    }

    /// Transport whose group joins wait until released.
    struct GatedTransport {
        inner: ChannelTransport,
        joining: Notify,
        release: Notify,
    }

    #[async_trait]
    impl RealtimeTransport for GatedTransport {
        async fn add_to_group(&self, connection_id: &str, group: &str) -> Result<(), TransportError> {
            self.joining.notify_one();
            self.release.notified().await;
            self.inner.add_to_group(connection_id, group).await
        }

        async fn remove_from_group(
            &self,
            connection_id: &str,
            group: &str,
        ) -> Result<(), TransportError> {
            self.inner.remove_from_group(connection_id, group).await
        }

        async fn send_to_caller(
            &self,
            connection_id: &str,
            event: &str,
            payload: Arc<Value>,
        ) -> Result<(), TransportError> {
            self.inner.send_to_caller(connection_id, event, payload).await
        }

        async fn send_to_group(
            &self,
            group: &str,
            event: &str,
            payload: Arc<Value>,
        ) -> Result<usize, TransportError> {
            self.inner.send_to_group(group, event, payload).await
        }
    }

    /// Disconnect `c1` while its subscribe to `weather` is joining the group,
    /// optionally reconnect, then let the join finish.
    async fn disconnect_during_join(
        reconnect: bool,
    ) -> (Arc<BroadcastGateway<GatedTransport>>, Result<(), TransportError>) {
        let transport = Arc::new(GatedTransport {
            inner: ChannelTransport::new(16),
            joining: Notify::new(),
            release: Notify::new(),
        });
        let registry = Arc::new(ContextRegistry::new(UnknownContextPolicy::CreateOnDemand));
        let gateway = Arc::new(BroadcastGateway::new(Arc::clone(&transport), registry, true));
        let _rx = transport.inner.connect("c1");
        gateway.on_connect("c1");

        let task = tokio::spawn({
            let gateway = Arc::clone(&gateway);
            async move { gateway.on_subscribe("c1", "weather").await }
        });
        transport.joining.notified().await;

        gateway.on_disconnect("c1", Some("socket reset"));
        if reconnect {
            gateway.on_connect("c1");
        }
        transport.release.notify_one();

        let result = task.await.unwrap();
        assert!(transport.inner.members("weather").is_empty());
        (gateway, result)
    }

    #[tokio::test]
    async fn test_disconnect_during_subscribe_is_not_counted() {
        let (gateway, result) = disconnect_during_join(false).await;

        assert_eq!(
            result.unwrap_err(),
            TransportError::UnknownConnection("c1".to_string())
        );
        assert_eq!(
            gateway.registry().get("weather").map_or(0, |e| e.connection_count),
            0
        );
        assert!(gateway.subscriptions_of("c1").is_empty());
    }

    #[tokio::test]
    async fn test_stale_subscribe_not_counted_for_new_connection() {
        let (gateway, result) = disconnect_during_join(true).await;

        assert!(result.is_err());
        assert!(gateway.subscriptions_of("c1").is_empty());
        assert!(!gateway.registry().exists("weather"));
    }
}
