//!
//! rbacstore storage module
//! ------------------------
//! The hierarchical entity store shared by the Roles and Permissions partitions.
//!
//! Each partition is a nested-set tree: every node carries `[left, right]` bounds and
//! ancestry is interval containment. Inserting or removing a node shifts bounds across
//! the partition (cost proportional to its size), in exchange for ancestor and
//! descendant queries that never recurse.
//!
//! Key pieces:
//! - `NestedSet`: the lock-free algorithm and its invariants.
//! - `Partition`: a `parking_lot::RwLock` around one `NestedSet` with bounded waits and
//!   staged mutations.
//! - `EntityRef`: id, path or title addressing of a node.
//! - `snapshot`: versioned, checksummed on-disk image of both partitions and all edges.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod nested_set;
pub mod paths;
mod partition;
mod reference;
pub mod snapshot;

pub use nested_set::{NestedSet, Node, NodeId, PathEntry, ROOT_TITLE};
pub use partition::Partition;
pub use paths::SEPARATOR;
pub use reference::EntityRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionKind {
    Roles,
    Permissions,
}

impl PartitionKind {
    pub fn name(&self) -> &'static str {
        match self {
            PartitionKind::Roles => "roles",
            PartitionKind::Permissions => "permissions",
        }
    }
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}
