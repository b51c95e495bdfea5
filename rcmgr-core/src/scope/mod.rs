use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::limit::{Direction, Limit};
use crate::resources::{Delta, Exceeded, Resources, ScopeStat};

mod span;

pub use span::ResourceScopeSpan;

/// Scope ids double as the global lock order. A scope always gets a larger id
/// than every one of its ancestors, because parents must exist first.
static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

fn next_scope_id() -> u64 {
    NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed)
}

struct ScopeInner {
    id: u64,
    name: String,
    transaction: bool,
    parents: Vec<ResourceScope>,
    ref_count: AtomicUsize,
    state: Mutex<ScopeState>,
}

struct ScopeState {
    rc: Resources,
    /// What was reserved directly on this scope, as opposed to through a
    /// descendant.
    own: ScopeStat,
    closed: bool,
    /// Every open scope naming this one as a parent, transactions included.
    children: Vec<Weak<ScopeInner>>,
}

impl ScopeState {
    fn new(limit: Arc<dyn Limit>) -> ScopeState {
        Self {
            rc: Resources::new(limit),
            own: ScopeStat::default(),
            closed: false,
            children: Vec::new(),
        }
    }
}

/// A node in the accounting DAG.
///
/// Every reservation made through a scope is checked against, and mirrored
/// into, the scope itself and each distinct ancestor reachable through its
/// parents. A scope reached along several paths is counted once.
///
/// `ResourceScope` is a cheap handle; clones refer to the same node.
///
/// # Examples
///
/// ```rust
/// use rust_p2p_rcmgr_core::limit::{Direction, StaticLimit};
/// use rust_p2p_rcmgr_core::scope::ResourceScope;
///
/// # fn main() -> rust_p2p_rcmgr_core::error::Result<()> {
/// let system = ResourceScope::new_root(StaticLimit::default().set_memory(4096).set_streams(8, 8));
/// let peer = ResourceScope::new(StaticLimit::default().set_memory(1024).set_streams(1, 1), &[system.clone()])?;
///
/// peer.add_stream(Direction::Inbound)?;
/// assert!(peer.add_stream(Direction::Inbound).is_err());
/// assert_eq!(system.stat().num_streams_inbound, 1);
///
/// peer.remove_stream(Direction::Inbound);
/// assert!(system.stat().is_empty());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ResourceScope {
    inner: Arc<ScopeInner>,
}

/// Builds a scope with an optional name and any number of parents.
pub struct ScopeBuilder {
    limit: Arc<dyn Limit>,
    name: Option<String>,
    parents: Vec<ResourceScope>,
}

impl ScopeBuilder {
    pub fn new<L: Limit + 'static>(limit: L) -> ScopeBuilder {
        Self::with_shared_limit(Arc::new(limit))
    }
    pub fn with_shared_limit(limit: Arc<dyn Limit>) -> ScopeBuilder {
        Self {
            limit,
            name: None,
            parents: Vec::new(),
        }
    }
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name.replace(name.into());
        self
    }
    pub fn parent(mut self, parent: &ResourceScope) -> Self {
        self.parents.push(parent.clone());
        self
    }
    pub fn parents(mut self, parents: &[ResourceScope]) -> Self {
        self.parents.extend_from_slice(parents);
        self
    }
    pub fn build(self) -> Result<ResourceScope> {
        let mut parents: Vec<ResourceScope> = Vec::with_capacity(self.parents.len());
        for parent in self.parents {
            if !parents.iter().any(|p| p.inner.id == parent.inner.id) {
                parents.push(parent);
            }
        }
        check_acyclic(&parents)?;
        let id = next_scope_id();
        let name = self.name.unwrap_or_else(|| format!("scope-{id}"));
        ResourceScope::attach(ScopeInner {
            id,
            name,
            transaction: false,
            parents,
            ref_count: AtomicUsize::new(0),
            state: Mutex::new(ScopeState::new(self.limit)),
        })
    }
}

impl ResourceScope {
    /// Register a new scope with its parents, failing if any of them has ended.
    fn attach(inner: ScopeInner) -> Result<ResourceScope> {
        let scope = ResourceScope {
            inner: Arc::new(inner),
        };
        let mut parents: Vec<&ResourceScope> = scope.inner.parents.iter().collect();
        parents.sort_unstable_by_key(|parent| parent.inner.id);
        let mut guards = lock_all(&parents);
        for (parent, state) in parents.iter().zip(guards.iter()) {
            if state.closed {
                log::warn!("new scope under closed parent parent={}", parent.inner.name);
                return Err(Error::ScopeClosed(parent.inner.name.clone()));
            }
        }
        for state in guards.iter_mut() {
            state.children.retain(|child| child.strong_count() > 0);
            state.children.push(Arc::downgrade(&scope.inner));
        }
        drop(guards);
        drop(parents);
        Ok(scope)
    }
    /// Create a scope with no parents.
    pub fn new_root<L: Limit + 'static>(limit: L) -> ResourceScope {
        let id = next_scope_id();
        ResourceScope {
            inner: Arc::new(ScopeInner {
                id,
                name: format!("scope-{id}"),
                transaction: false,
                parents: Vec::new(),
                ref_count: AtomicUsize::new(0),
                state: Mutex::new(ScopeState::new(Arc::new(limit))),
            }),
        }
    }
    /// Create a scope under `parents`. Parents may overlap transitively.
    pub fn new<L: Limit + 'static>(limit: L, parents: &[ResourceScope]) -> Result<ResourceScope> {
        ScopeBuilder::new(limit).parents(parents).build()
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }
    pub fn name(&self) -> &str {
        &self.inner.name
    }
    pub fn parents(&self) -> &[ResourceScope] {
        &self.inner.parents
    }
    pub fn is_transaction(&self) -> bool {
        self.inner.transaction
    }
    /// Whether this scope has ended, either through its own [`done`](Self::done)
    /// or because one of its ancestors ended.
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }
    /// Current usage of this scope, including everything reserved through
    /// its descendants. Always empty once the scope has ended.
    pub fn stat(&self) -> ScopeStat {
        self.inner.state.lock().rc.stat()
    }
}

impl ResourceScope {
    pub fn reserve_memory(&self, size: u64) -> Result<()> {
        self.reserve(Delta::Memory(size))
    }
    pub fn release_memory(&self, size: u64) {
        self.release(Delta::Memory(size))
    }
    pub fn add_stream(&self, dir: Direction) -> Result<()> {
        self.reserve(Delta::Stream(dir))
    }
    pub fn remove_stream(&self, dir: Direction) {
        self.release(Delta::Stream(dir))
    }
    pub fn add_conn(&self, dir: Direction) -> Result<()> {
        self.reserve(Delta::Conn(dir))
    }
    pub fn remove_conn(&self, dir: Direction) {
        self.release(Delta::Conn(dir))
    }
    pub fn add_fd(&self, n: usize) -> Result<()> {
        self.reserve(Delta::Fd(n))
    }
    pub fn remove_fd(&self, n: usize) {
        self.release(Delta::Fd(n))
    }

    /// Check whether `size` more bytes fit in every scope of the closure,
    /// without reserving them.
    pub fn check_memory(&self, size: u64) -> Result<()> {
        let closure = self.closure();
        let guards = lock_all(&closure);
        check_all(&closure, &guards, &Delta::Memory(size))
    }

    /// Reserve `delta` on this scope and on all of its ancestors, or on none.
    pub fn reserve(&self, delta: Delta) -> Result<()> {
        let closure = self.closure();
        let mut guards = lock_all(&closure);
        if let Err(e) = check_all(&closure, &guards, &delta) {
            if e.is_scope_closed() {
                log::warn!("reserve on closed scope scope={},delta={delta:?},e={e}", self.inner.name);
            } else {
                log::debug!("reserve denied scope={},delta={delta:?},e={e}", self.inner.name);
            }
            return Err(e);
        }
        for state in guards.iter_mut() {
            state.rc.commit(&delta);
        }
        // sorted by id, so this scope is last
        if let Some(state) = guards.last_mut() {
            state.own.add(&delta);
        }
        Ok(())
    }

    /// Release `delta` from this scope and all of its ancestors.
    ///
    /// A no-op once the scope has ended.
    pub fn release(&self, delta: Delta) {
        let closure = self.closure();
        let mut guards = lock_all(&closure);
        if guards.iter().any(|state| state.closed) {
            log::debug!("release on closed scope scope={},delta={delta:?}", self.inner.name);
            return;
        }
        for state in guards.iter_mut() {
            state.rc.release(&delta);
        }
        if let Some(state) = guards.last_mut() {
            state.own.sub(&delta);
        }
    }
}

impl ResourceScope {
    /// Open a transaction under this scope sharing its limit.
    pub fn begin_transaction(&self) -> Result<ResourceScopeSpan> {
        let limit = self.inner.state.lock().rc.limit().clone();
        self.begin_transaction_with_shared_limit(limit)
    }
    /// Open a transaction under this scope with its own, usually tighter, limit.
    pub fn begin_transaction_with_limit<L: Limit + 'static>(
        &self,
        limit: L,
    ) -> Result<ResourceScopeSpan> {
        self.begin_transaction_with_shared_limit(Arc::new(limit))
    }
    fn begin_transaction_with_shared_limit(&self, limit: Arc<dyn Limit>) -> Result<ResourceScopeSpan> {
        let id = next_scope_id();
        let txn = ResourceScope::attach(ScopeInner {
            id,
            name: format!("{}.txn-{id}", self.inner.name),
            transaction: true,
            parents: vec![self.clone()],
            ref_count: AtomicUsize::new(0),
            state: Mutex::new(ScopeState::new(limit)),
        })?;
        Ok(ResourceScopeSpan::new(txn))
    }

    /// End this scope.
    ///
    /// The scope and every open scope beneath it, transactions and scopes
    /// built with it as a parent alike, are closed together. What each of
    /// them reserved directly is released from every ancestor that stays
    /// open, so a diamond below this scope leaves its other branches exact.
    /// Calling `done` again, or on a scope already closed by an ancestor, has
    /// no effect.
    pub fn done(&self) {
        loop {
            let ending = self.subtree();
            let closure = closure_of(ending.iter());
            let mut guards = lock_all(&closure);
            let index: HashMap<u64, usize> = closure
                .iter()
                .enumerate()
                .map(|(i, scope)| (scope.inner.id, i))
                .collect();
            if guards[index[&self.inner.id]].closed {
                return;
            }
            let ending_ids: HashSet<u64> = ending.iter().map(|scope| scope.inner.id).collect();
            let ending_ptrs: HashSet<*const ScopeInner> =
                ending.iter().map(|scope| Arc::as_ptr(&scope.inner)).collect();
            let grown = ending.iter().any(|scope| {
                guards[index[&scope.inner.id]].children.iter().any(|child| {
                    child.strong_count() > 0 && !ending_ptrs.contains(&child.as_ptr())
                })
            });
            if grown {
                // a child was attached after the walk
                continue;
            }

            let mut released = ScopeStat::default();
            for scope in &ending {
                let own = {
                    let state = &guards[index[&scope.inner.id]];
                    if state.closed {
                        continue;
                    }
                    state.own
                };
                if own.is_empty() {
                    continue;
                }
                if scope == self {
                    released = own;
                }
                for ancestor in scope.closure() {
                    if ending_ids.contains(&ancestor.inner.id) {
                        continue;
                    }
                    let state = &mut guards[index[&ancestor.inner.id]];
                    if !state.closed {
                        state.rc.release_stat(&own);
                    }
                }
            }
            for (scope, state) in closure.iter().zip(guards.iter_mut()) {
                if ending_ids.contains(&scope.inner.id) {
                    state.closed = true;
                    state.rc.reset();
                    state.own = ScopeStat::default();
                    state.children.clear();
                } else {
                    state.children.retain(|child| {
                        child.strong_count() > 0 && !ending_ptrs.contains(&child.as_ptr())
                    });
                }
            }
            drop(guards);
            log::debug!(
                "scope done scope={},released={released:?},closed={}",
                self.inner.name,
                ending.len()
            );
            return;
        }
    }

    /// This scope and every open scope beneath it, collected one lock at a time.
    fn subtree(&self) -> Vec<ResourceScope> {
        let mut seen = HashSet::new();
        let mut subtree = Vec::new();
        let mut stack = vec![self.clone()];
        while let Some(scope) = stack.pop() {
            if !seen.insert(scope.inner.id) {
                continue;
            }
            let children: Vec<Arc<ScopeInner>> = scope
                .inner
                .state
                .lock()
                .children
                .iter()
                .filter_map(Weak::upgrade)
                .collect();
            stack.extend(children.into_iter().map(|inner| ResourceScope { inner }));
            subtree.push(scope);
        }
        subtree
    }
}

impl ResourceScope {
    /// Register an external holder of this scope.
    pub fn inc_ref(&self) {
        self.inner.ref_count.fetch_add(1, Ordering::AcqRel);
    }
    pub fn dec_ref(&self) {
        let rs = self
            .inner
            .ref_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| v.checked_sub(1));
        if rs.is_err() {
            log::warn!("dec_ref without holder scope={}", self.inner.name);
        }
    }
    pub fn ref_count(&self) -> usize {
        self.inner.ref_count.load(Ordering::Acquire)
    }
}

impl ResourceScope {
    fn closure(&self) -> Vec<&ResourceScope> {
        closure_of(std::iter::once(self))
    }
    fn limit_exceeded(&self, e: Exceeded) -> Error {
        Error::ResourceLimitExceeded {
            scope: self.inner.name.clone(),
            resource: e.resource,
            current: e.current,
            requested: e.requested,
            limit: e.limit,
        }
    }
}

impl PartialEq for ResourceScope {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ResourceScope {}

impl fmt::Debug for ResourceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceScope")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .finish()
    }
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        // nothing beneath is left: every descendant holds its parents alive
        let state = self.state.get_mut();
        if state.closed || state.own.is_empty() {
            return;
        }
        let own = state.own;
        log::warn!("scope dropped with reservations scope={},stat={own:?}", self.name);
        let closure = closure_of(self.parents.iter());
        let mut guards = lock_all(&closure);
        for state in guards.iter_mut() {
            if !state.closed {
                state.rc.release_stat(&own);
            }
        }
    }
}

/// The deduplicated set of `roots` and all their ancestors, in lock order.
fn closure_of<'a, I: Iterator<Item = &'a ResourceScope>>(roots: I) -> Vec<&'a ResourceScope> {
    let mut seen = HashSet::new();
    let mut stack: Vec<&ResourceScope> = roots.collect();
    let mut closure = Vec::with_capacity(stack.len());
    while let Some(scope) = stack.pop() {
        if seen.insert(scope.inner.id) {
            stack.extend(scope.inner.parents.iter());
            closure.push(scope);
        }
    }
    closure.sort_unstable_by_key(|scope| scope.inner.id);
    closure
}

fn lock_all<'a>(closure: &[&'a ResourceScope]) -> Vec<MutexGuard<'a, ScopeState>> {
    closure.iter().map(|scope| scope.inner.state.lock()).collect()
}

fn check_all(
    closure: &[&ResourceScope],
    guards: &[MutexGuard<'_, ScopeState>],
    delta: &Delta,
) -> Result<()> {
    for (scope, state) in closure.iter().zip(guards) {
        if state.closed {
            return Err(Error::ScopeClosed(scope.inner.name.clone()));
        }
    }
    for (scope, state) in closure.iter().zip(guards) {
        state.rc.check(delta).map_err(|e| scope.limit_exceeded(e))?;
    }
    Ok(())
}

/// Parents are fixed at construction so a cycle cannot be built through this
/// API; the walk rejects one anyway rather than loop forever on it.
fn check_acyclic(parents: &[ResourceScope]) -> Result<()> {
    let mut done = HashSet::new();
    let mut path = HashSet::new();
    let mut stack: Vec<(&ResourceScope, bool)> = parents.iter().map(|p| (p, false)).collect();
    while let Some((scope, expanded)) = stack.pop() {
        let id = scope.inner.id;
        if expanded {
            path.remove(&id);
            done.insert(id);
            continue;
        }
        if done.contains(&id) {
            continue;
        }
        if !path.insert(id) {
            return Err(Error::InvalidParentGraph(format!(
                "cycle through scope {}",
                scope.inner.name
            )));
        }
        stack.push((scope, true));
        stack.extend(scope.inner.parents.iter().map(|p| (p, false)));
    }
    Ok(())
}
