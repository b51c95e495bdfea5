use std::fmt;
use std::ops::Deref;

use rust_p2p_rcmgr_core::limit::Direction;
use rust_p2p_rcmgr_core::scope::ResourceScope;

/// Ends `scope` and drops the ref it held on `owner` when dropped.
struct OwnedScope {
    scope: ResourceScope,
    owner: Option<ResourceScope>,
}

impl OwnedScope {
    fn new(scope: ResourceScope, owner: Option<ResourceScope>) -> OwnedScope {
        Self { scope, owner }
    }
}

impl Drop for OwnedScope {
    fn drop(&mut self) {
        self.scope.done();
        if let Some(owner) = &self.owner {
            owner.dec_ref();
        }
    }
}

/// The accounting scope of one connection.
///
/// Holds one connection slot (and optionally one file descriptor) until it
/// is dropped. Memory for buffers and handshakes is reserved through it,
/// directly or in a transaction.
pub struct ConnectionScope {
    inner: OwnedScope,
    dir: Direction,
    use_fd: bool,
}

impl ConnectionScope {
    pub(crate) fn new(
        scope: ResourceScope,
        peer: Option<ResourceScope>,
        dir: Direction,
        use_fd: bool,
    ) -> ConnectionScope {
        Self {
            inner: OwnedScope::new(scope, peer),
            dir,
            use_fd,
        }
    }
    pub fn direction(&self) -> Direction {
        self.dir
    }
    pub fn uses_fd(&self) -> bool {
        self.use_fd
    }
    /// `None` while the connection is accounted to the transient scope.
    pub fn peer_scope(&self) -> Option<&ResourceScope> {
        self.inner.owner.as_ref()
    }
    pub fn scope(&self) -> &ResourceScope {
        &self.inner.scope
    }
}

impl Deref for ConnectionScope {
    type Target = ResourceScope;

    fn deref(&self) -> &Self::Target {
        &self.inner.scope
    }
}

impl fmt::Debug for ConnectionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionScope")
            .field("scope", &self.inner.scope)
            .field("dir", &self.dir)
            .field("use_fd", &self.use_fd)
            .finish()
    }
}

/// The accounting scope of one stream, holding one stream slot until dropped.
pub struct StreamScope {
    inner: OwnedScope,
    dir: Direction,
}

impl StreamScope {
    pub(crate) fn new(scope: ResourceScope, peer: ResourceScope, dir: Direction) -> StreamScope {
        Self {
            inner: OwnedScope::new(scope, Some(peer)),
            dir,
        }
    }
    pub fn direction(&self) -> Direction {
        self.dir
    }
    pub fn peer_scope(&self) -> Option<&ResourceScope> {
        self.inner.owner.as_ref()
    }
    pub fn scope(&self) -> &ResourceScope {
        &self.inner.scope
    }
}

impl Deref for StreamScope {
    type Target = ResourceScope;

    fn deref(&self) -> &Self::Target {
        &self.inner.scope
    }
}

impl fmt::Debug for StreamScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamScope")
            .field("scope", &self.inner.scope)
            .field("dir", &self.dir)
            .finish()
    }
}
