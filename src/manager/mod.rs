use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_p2p_rcmgr_core::error::Result;
use rust_p2p_rcmgr_core::limit::Direction;
use rust_p2p_rcmgr_core::resources::ScopeStat;
use rust_p2p_rcmgr_core::scope::{ResourceScope, ScopeBuilder};

use crate::config::{ResourceManagerConfig, SYSTEM_SCOPE_NAME, TRANSIENT_SCOPE_NAME};

mod scopes;

pub use scopes::{ConnectionScope, StreamScope};

struct ManagerInner<PeerID> {
    config: ResourceManagerConfig,
    system: ResourceScope,
    transient: ResourceScope,
    peers: DashMap<PeerID, ResourceScope>,
}

/// Entry point for transports and multiplexers.
///
/// Owns the `system` scope, the `transient` scope for connections whose peer
/// is not known yet, and one scope per peer. Connections and streams get a
/// scope of their own under those.
pub struct ResourceManager<PeerID> {
    inner: Arc<ManagerInner<PeerID>>,
}

impl<PeerID> Clone for ResourceManager<PeerID> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<PeerID: Hash + Eq + Clone + Debug> ResourceManager<PeerID> {
    pub fn new(config: ResourceManagerConfig) -> Result<ResourceManager<PeerID>> {
        let system = ScopeBuilder::new(config.system)
            .name(SYSTEM_SCOPE_NAME)
            .build()?;
        let transient = ScopeBuilder::new(config.transient)
            .name(TRANSIENT_SCOPE_NAME)
            .parent(&system)
            .build()?;
        Ok(Self {
            inner: Arc::new(ManagerInner {
                config,
                system,
                transient,
                peers: DashMap::with_capacity(64),
            }),
        })
    }
    pub fn config(&self) -> &ResourceManagerConfig {
        &self.inner.config
    }
    pub fn system_scope(&self) -> &ResourceScope {
        &self.inner.system
    }
    pub fn transient_scope(&self) -> &ResourceScope {
        &self.inner.transient
    }
    pub fn stat(&self) -> ScopeStat {
        self.inner.system.stat()
    }
    pub fn peer_stat(&self, peer: &PeerID) -> Option<ScopeStat> {
        self.inner.peers.get(peer).map(|scope| scope.stat())
    }
    pub fn peers(&self) -> Vec<PeerID> {
        self.inner.peers.iter().map(|v| v.key().clone()).collect()
    }
}

impl<PeerID: Hash + Eq + Clone + Debug> ResourceManager<PeerID> {
    /// Get or create the scope of `peer`.
    ///
    /// The returned handle does not keep the scope from being collected by
    /// [`gc`](Self::gc); take a ref with `inc_ref` to hold on to it.
    pub fn peer_scope(&self, peer: &PeerID) -> Result<ResourceScope> {
        if let Some(scope) = self.inner.peers.get(peer) {
            return Ok(scope.value().clone());
        }
        self.peer_entry(peer, false)
    }

    /// Open the scope of a new connection, reserving one connection slot of
    /// `dir` and, when `use_fd` is set, one file descriptor.
    ///
    /// The connection counts against `peer`, or against the transient scope
    /// when the peer is not known yet, and always against the system scope.
    pub fn open_connection(
        &self,
        peer: Option<&PeerID>,
        dir: Direction,
        use_fd: bool,
    ) -> Result<ConnectionScope> {
        let peer_scope = match peer {
            Some(peer) => Some(self.peer_entry(peer, true)?),
            None => None,
        };
        let owner = peer_scope.as_ref().unwrap_or(&self.inner.transient);
        let scope = ScopeBuilder::new(self.inner.config.conn)
            .name(format!("{}.conn", owner.name()))
            .parent(owner)
            .parent(&self.inner.system)
            .build();
        let scope = match scope {
            Ok(scope) => scope,
            Err(e) => {
                if let Some(peer_scope) = &peer_scope {
                    peer_scope.dec_ref();
                }
                return Err(e);
            }
        };
        let conn = ConnectionScope::new(scope, peer_scope, dir, use_fd);
        if let Err(e) = conn.add_conn(dir) {
            log::debug!("open_connection denied, e={e},peer={peer:?},dir={dir:?}");
            return Err(e);
        }
        if use_fd {
            if let Err(e) = conn.add_fd(1) {
                log::debug!("open_connection fd denied, e={e},peer={peer:?}");
                return Err(e);
            }
        }
        Ok(conn)
    }

    /// Open the scope of a new stream to `peer`, reserving one stream slot of `dir`.
    pub fn open_stream(&self, peer: &PeerID, dir: Direction) -> Result<StreamScope> {
        let peer_scope = self.peer_entry(peer, true)?;
        let scope = ScopeBuilder::new(self.inner.config.stream)
            .name(format!("{}.stream", peer_scope.name()))
            .parent(&peer_scope)
            .parent(&self.inner.system)
            .build();
        let scope = match scope {
            Ok(scope) => scope,
            Err(e) => {
                peer_scope.dec_ref();
                return Err(e);
            }
        };
        let stream = StreamScope::new(scope, peer_scope, dir);
        if let Err(e) = stream.add_stream(dir) {
            log::debug!("open_stream denied, e={e},peer={peer:?},dir={dir:?}");
            return Err(e);
        }
        Ok(stream)
    }

    /// End and forget every peer scope that nobody holds and that has
    /// nothing reserved. Returns how many were collected.
    pub fn gc(&self) -> usize {
        let mut collected = 0;
        self.inner.peers.retain(|peer, scope| {
            if scope.ref_count() > 0 || !scope.stat().is_empty() {
                return true;
            }
            scope.done();
            log::debug!("gc peer scope peer={peer:?}");
            collected += 1;
            false
        });
        collected
    }

    fn peer_entry(&self, peer: &PeerID, hold: bool) -> Result<ResourceScope> {
        // the ref is taken under the shard lock so gc cannot collect in between
        let scope = match self.inner.peers.entry(peer.clone()) {
            Entry::Occupied(entry) => {
                let scope = entry.get().clone();
                if hold {
                    scope.inc_ref();
                }
                scope
            }
            Entry::Vacant(entry) => {
                let scope = ScopeBuilder::new(self.inner.config.peer)
                    .name(format!("peer:{peer:?}"))
                    .parent(&self.inner.system)
                    .build()?;
                if hold {
                    scope.inc_ref();
                }
                entry.insert(scope.clone());
                scope
            }
        };
        Ok(scope)
    }
}
