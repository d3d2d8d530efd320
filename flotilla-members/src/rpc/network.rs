use std::collections::BTreeMap;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use flotilla_futures::sequential_transform;
use parking_lot::RwLock;

use crate::broker::NodeId;
use crate::diff::BrokerDiff;
use crate::rpc::controller::ControllerClient;

/// Creates client connections to the controller service of other nodes.
pub trait Transport: Send + Sync + 'static {
    type Client: ControllerClient + Clone;

    /// Connects to the node listening on the given address.
    fn connect(&self, addr: SocketAddr) -> io::Result<Self::Client>;
}

struct CachedClient<C> {
    addr: SocketAddr,
    client: C,
}

/// The set of open client connections to the other brokers of the cluster.
///
/// A single logical cache shared by every shard, clones share the same
/// connections. The cache is only changed by applying group configuration
/// diffs and never holds a connection to the local node.
pub struct ConnectionCache<T: Transport> {
    transport: Arc<T>,
    clients: Arc<RwLock<BTreeMap<NodeId, CachedClient<T::Client>>>>,
}

impl<T: Transport> Clone for ConnectionCache<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            clients: self.clients.clone(),
        }
    }
}

impl<T: Transport> ConnectionCache<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
            clients: Arc::default(),
        }
    }

    #[inline]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.clients.read().contains_key(&node_id)
    }

    pub fn get(&self, node_id: NodeId) -> Option<T::Client> {
        self.clients
            .read()
            .get(&node_id)
            .map(|cached| cached.client.clone())
    }

    /// The address the cached client of the node is connected to.
    pub fn address_of(&self, node_id: NodeId) -> Option<SocketAddr> {
        self.clients.read().get(&node_id).map(|cached| cached.addr)
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.clients.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }

    /// Creates a client for the node, replacing any existing one.
    ///
    /// The replaced client is closed.
    pub fn update_broker_client(&self, node_id: NodeId, addr: SocketAddr) -> io::Result<()> {
        let client = self.transport.connect(addr)?;

        let replaced = {
            let mut guard = self.clients.write();
            guard.insert(node_id, CachedClient { addr, client })
        };

        if let Some(replaced) = replaced {
            replaced.client.close();
        }

        debug!(node_id = node_id, addr = %addr, "Updated broker client.");
        Ok(())
    }

    /// Removes and closes the client of the node, if one exists.
    pub fn remove_broker_client(&self, node_id: NodeId) {
        let removed = self.clients.write().remove(&node_id);

        if let Some(removed) = removed {
            removed.client.close();
            debug!(node_id = node_id, addr = %removed.addr, "Removed broker client.");
        }
    }

    /// Runs `func` with a client connected to the given node.
    ///
    /// The cached client is used when it is connected to `addr`. Otherwise a
    /// transient client is created which is closed once `func` completes and
    /// is never added to the cache.
    pub async fn with_client<F, Fut, R>(
        &self,
        node_id: NodeId,
        addr: SocketAddr,
        func: F,
    ) -> io::Result<R>
    where
        F: FnOnce(T::Client) -> Fut,
        Fut: Future<Output = R>,
    {
        let cached = {
            let guard = self.clients.read();
            guard
                .get(&node_id)
                .filter(|cached| cached.addr == addr)
                .map(|cached| cached.client.clone())
        };

        if let Some(client) = cached {
            return Ok(func(client).await);
        }

        trace!(node_id = node_id, addr = %addr, "Connecting transient client.");
        let client = self.transport.connect(addr)?;
        let result = func(client.clone()).await;
        client.close();

        Ok(result)
    }

    /// Applies a broker diff to the cache.
    ///
    /// Deleted brokers are disconnected before any added broker is connected,
    /// the local node is never connected to.
    pub async fn reconcile(&self, local_node: NodeId, diff: &BrokerDiff) -> io::Result<()> {
        sequential_transform(diff.deletions.iter(), |broker| async move {
            self.remove_broker_client(broker.id());
            Ok::<_, io::Error>(())
        })
        .await?;

        let additions = diff
            .additions
            .iter()
            .filter(|broker| broker.id() != local_node);

        sequential_transform(additions, |broker| async move {
            self.update_broker_client(broker.id(), broker.rpc_address())
        })
        .await?;

        Ok(())
    }
}
