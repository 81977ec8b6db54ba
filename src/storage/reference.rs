use std::fmt;

use serde::{Deserialize, Serialize};

use super::nested_set::{NestedSet, NodeId};
use super::paths;
use crate::error::{RbacError, Result};

/// How a caller addresses a node: by id, by full path, or by title.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum EntityRef {
    Id(NodeId),
    Path(String),
    Title(String),
}

impl EntityRef {
    /// `#12` is an id, `/a/b` a path, anything else a title.
    pub fn parse(s: &str) -> Result<EntityRef> {
        if let Some(num) = s.strip_prefix('#') {
            return num.parse::<u64>().map(|v| EntityRef::Id(NodeId(v)))
                .map_err(|_| RbacError::invalid("invalid_reference", format!("'{}' is not a node id", s)));
        }
        if s.is_empty() {
            return Err(RbacError::invalid("invalid_reference", "empty reference"));
        }
        if paths::is_path(s) { Ok(EntityRef::Path(s.to_string())) } else { Ok(EntityRef::Title(s.to_string())) }
    }

    pub fn resolve(&self, set: &NestedSet) -> Result<NodeId> {
        match self {
            EntityRef::Id(id) => {
                if set.contains_id(*id) { Ok(*id) } else { Err(RbacError::invalid("unknown_node", format!("node {} does not exist", id))) }
            }
            EntityRef::Path(p) => set.resolve_path(p),
            EntityRef::Title(t) => set.resolve_title(t),
        }
    }
}

impl From<NodeId> for EntityRef {
    fn from(id: NodeId) -> Self { EntityRef::Id(id) }
}

impl From<&str> for EntityRef {
    fn from(s: &str) -> Self {
        if paths::is_path(s) { EntityRef::Path(s.to_string()) } else { EntityRef::Title(s.to_string()) }
    }
}

impl From<String> for EntityRef {
    fn from(s: String) -> Self {
        if paths::is_path(&s) { EntityRef::Path(s) } else { EntityRef::Title(s) }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Id(id) => write!(f, "#{}", id),
            EntityRef::Path(p) => f.write_str(p),
            EntityRef::Title(t) => f.write_str(t),
        }
    }
}
