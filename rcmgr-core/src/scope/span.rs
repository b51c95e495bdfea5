use std::fmt;
use std::ops::Deref;

use crate::scope::ResourceScope;

/// A transaction scope that ends itself when dropped.
///
/// Derefs to the underlying [`ResourceScope`], so reservations and nested
/// transactions are made directly on the span.
pub struct ResourceScopeSpan {
    scope: ResourceScope,
}

impl ResourceScopeSpan {
    pub(crate) fn new(scope: ResourceScope) -> ResourceScopeSpan {
        Self { scope }
    }
    pub fn scope(&self) -> &ResourceScope {
        &self.scope
    }
}

impl Deref for ResourceScopeSpan {
    type Target = ResourceScope;

    fn deref(&self) -> &Self::Target {
        &self.scope
    }
}

impl Drop for ResourceScopeSpan {
    fn drop(&mut self) {
        self.scope.done();
    }
}

impl fmt::Debug for ResourceScopeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResourceScopeSpan").field(&self.scope).finish()
    }
}

#[cfg(test)]
mod test {
    use crate::limit::StaticLimit;
    use crate::scope::ResourceScope;

    #[test]
    fn test_drop_ends_transaction() {
        let root = ResourceScope::new_root(StaticLimit::default().set_memory(4096));
        {
            let txn = root.begin_transaction().unwrap();
            txn.reserve_memory(1024).unwrap();
            assert!(txn.is_transaction());
            assert_eq!(root.stat().memory, 1024);
        }
        assert!(root.stat().is_empty());
        root.reserve_memory(4096).unwrap();
    }

    #[test]
    fn test_scope_outlives_span() {
        let root = ResourceScope::new_root(StaticLimit::default().set_memory(4096));
        let txn = root.begin_transaction().unwrap();
        let handle = txn.scope().clone();
        handle.reserve_memory(512).unwrap();
        drop(txn);
        assert!(handle.is_closed());
        assert!(handle.stat().is_empty());
        assert!(handle.reserve_memory(1).unwrap_err().is_scope_closed());
        assert!(root.stat().is_empty());
    }

    #[test]
    fn test_nested_spans_drop_leaf_first() {
        let root = ResourceScope::new_root(StaticLimit::default().set_memory(4096));
        let outer = root.begin_transaction().unwrap();
        outer.reserve_memory(1024).unwrap();
        let inner = outer.begin_transaction().unwrap();
        inner.reserve_memory(1024).unwrap();
        assert_eq!(root.stat().memory, 2048);
        drop(inner);
        assert_eq!(outer.stat().memory, 1024);
        assert_eq!(root.stat().memory, 1024);
        drop(outer);
        assert!(root.stat().is_empty());
    }
}
