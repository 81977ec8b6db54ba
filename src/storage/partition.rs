use std::time::Duration;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

use super::nested_set::{NestedSet, Node, NodeId, PathEntry};
use super::PartitionKind;
use crate::error::{RbacError, Result};

/// One independently locked hierarchy (Roles or Permissions).
///
/// Readers share the lock. Structural changes are made only by `Rbac` transactions, which
/// hold the write lock, work on a staged copy and clean up the assignment edges of any
/// removed node before publishing.
pub struct Partition {
    kind: PartitionKind,
    set: RwLock<NestedSet>,
    lock_timeout: Duration,
}

impl Partition {
    pub fn new(kind: PartitionKind, lock_timeout: Duration) -> Self {
        Self { kind, set: RwLock::new(NestedSet::new()), lock_timeout }
    }

    pub fn kind(&self) -> PartitionKind { self.kind }

    /// Shared read guard, bounded by the configured lock timeout.
    pub fn read(&self) -> Result<RwLockReadGuard<'_, NestedSet>> {
        self.set.try_read_for(self.lock_timeout).ok_or_else(|| self.timeout("read"))
    }

    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, NestedSet>> {
        self.set.try_write_for(self.lock_timeout).ok_or_else(|| self.timeout("write"))
    }

    fn timeout(&self, mode: &str) -> RbacError {
        warn!(target: "rbacstore::partition", "{} lock on {} timed out after {:?}", mode, self.kind, self.lock_timeout);
        RbacError::busy("lock_timeout", format!("{} lock on {} not acquired within {} ms", mode, self.kind, self.lock_timeout.as_millis()))
    }

    pub fn children(&self, id: NodeId) -> Result<Vec<PathEntry>> { self.read()?.children(id) }
    pub fn descendants(&self, id: NodeId, absolute: bool) -> Result<Vec<PathEntry>> { self.read()?.descendants(id, absolute) }
    pub fn ancestor_path(&self, id: NodeId) -> Result<Vec<PathEntry>> { self.read()?.ancestor_path(id) }
    pub fn depth(&self, id: NodeId) -> Result<u64> { self.read()?.depth(id) }
    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>> { self.read()?.parent(id) }
    pub fn path_string(&self, id: NodeId) -> Result<String> { self.read()?.path_string(id) }
    pub fn resolve(&self, reference: &str) -> Result<NodeId> { self.read()?.resolve(reference) }
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> Result<bool> { self.read()?.is_ancestor(ancestor, node) }
    pub fn count(&self) -> Result<usize> { Ok(self.read()?.count()) }
    pub fn root_id(&self) -> Result<NodeId> { Ok(self.read()?.root_id()) }
    pub fn contains(&self, id: NodeId) -> Result<bool> { Ok(self.read()?.contains_id(id)) }
    pub fn get(&self, id: NodeId) -> Result<Node> { self.read()?.get(id).cloned() }
    pub fn title(&self, id: NodeId) -> Result<String> { Ok(self.read()?.get(id)?.title.clone()) }
    pub fn description(&self, id: NodeId) -> Result<String> { Ok(self.read()?.get(id)?.description.clone()) }
    pub fn validate(&self) -> Result<()> { self.read()?.validate() }

    /// Point-in-time copy for callers that need to walk the whole partition.
    pub fn snapshot(&self) -> Result<NestedSet> { Ok(self.read()?.clone()) }
}
