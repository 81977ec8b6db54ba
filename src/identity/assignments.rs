//! Role↔permission and role↔subject edges.
//!
//! Edges reference partition node ids but never touch partition structure. A fresh edge
//! set carries the sentinel root→root permission edge (id 1), which is bookkeeping only
//! and never grants anything.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::principal::SubjectId;
use crate::error::{RbacError, Result};
use crate::storage::snapshot::{PermissionEdgeRow, SubjectEdgeRow};
use crate::storage::{NestedSet, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub u64);

impl EdgeId {
    /// The root→root permission edge recreated by every assignment reset.
    pub const SENTINEL: EdgeId = EdgeId(1);
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectEdge {
    pub id: EdgeId,
    pub constraint: Option<String>,
}

/// Lock-free edge bookkeeping. `AssignmentGraph` wraps it in a `RwLock`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeSet {
    /// (role, permission) -> edge
    permissions: BTreeMap<(NodeId, NodeId), EdgeId>,
    /// (subject, role) -> edge
    subjects: BTreeMap<(SubjectId, NodeId), SubjectEdge>,
    next_permission_edge: u64,
    next_subject_edge: u64,
}

impl Default for EdgeSet {
    fn default() -> Self { Self::new() }
}

impl EdgeSet {
    pub fn new() -> Self {
        let mut permissions = BTreeMap::new();
        permissions.insert((NodeId::ROOT, NodeId::ROOT), EdgeId::SENTINEL);
        Self { permissions, subjects: BTreeMap::new(), next_permission_edge: EdgeId::SENTINEL.0 + 1, next_subject_edge: 1 }
    }

    /// Existing pairs are kept as they are and their id returned.
    pub fn assign(&mut self, role: NodeId, permission: NodeId) -> EdgeId {
        if let Some(id) = self.permissions.get(&(role, permission)) { return *id; }
        let id = EdgeId(self.next_permission_edge);
        self.next_permission_edge += 1;
        self.permissions.insert((role, permission), id);
        debug!(target: "rbacstore::assignments", "assign role={} permission={} edge={}", role, permission, id);
        id
    }

    pub fn unassign(&mut self, role: NodeId, permission: NodeId) -> bool {
        self.permissions.remove(&(role, permission)).is_some()
    }

    /// Existing pairs keep their original edge and constraint.
    pub fn assign_subject(&mut self, role: NodeId, subject: SubjectId, constraint: Option<String>) -> EdgeId {
        if let Some(e) = self.subjects.get(&(subject.clone(), role)) { return e.id; }
        let id = EdgeId(self.next_subject_edge);
        self.next_subject_edge += 1;
        debug!(target: "rbacstore::assignments", "grant role={} subject={} edge={}", role, subject, id);
        self.subjects.insert((subject, role), SubjectEdge { id, constraint });
        id
    }

    pub fn unassign_subject(&mut self, role: NodeId, subject: &SubjectId) -> bool {
        self.subjects.remove(&(subject.clone(), role)).is_some()
    }

    pub fn permission_edge(&self, role: NodeId, permission: NodeId) -> Option<EdgeId> {
        self.permissions.get(&(role, permission)).copied()
    }

    pub fn subject_edge(&self, role: NodeId, subject: &SubjectId) -> Option<&SubjectEdge> {
        self.subjects.get(&(subject.clone(), role))
    }

    /// Permission edges of one role, sentinel included, ordered by permission id.
    pub fn permission_edges_of(&self, role: NodeId) -> impl Iterator<Item = (NodeId, EdgeId)> + '_ {
        self.permissions.range((role, NodeId(0))..=(role, NodeId(u64::MAX))).map(|((_, p), id)| (*p, *id))
    }

    pub fn role_permissions(&self, role: NodeId) -> Vec<NodeId> {
        self.permission_edges_of(role).filter(|(_, id)| *id != EdgeId::SENTINEL).map(|(p, _)| p).collect()
    }

    pub fn permission_roles(&self, permission: NodeId) -> Vec<NodeId> {
        self.permissions.iter()
            .filter(|((_, p), id)| *p == permission && **id != EdgeId::SENTINEL)
            .map(|((r, _), _)| *r)
            .collect()
    }

    /// Roles directly granted to `subject`, ordered by role id.
    pub fn subject_roles(&self, subject: &SubjectId) -> Vec<NodeId> {
        self.subjects.range((subject.clone(), NodeId(0))..=(subject.clone(), NodeId(u64::MAX))).map(|((_, r), _)| *r).collect()
    }

    pub fn role_subjects(&self, role: NodeId) -> Vec<SubjectId> {
        self.subjects.keys().filter(|(_, r)| *r == role).map(|(s, _)| s.clone()).collect()
    }

    pub fn has_role(&self, role: NodeId, subject: &SubjectId) -> bool { self.subjects.contains_key(&(subject.clone(), role)) }

    pub fn role_count(&self, subject: &SubjectId) -> usize { self.subject_roles(subject).len() }

    /// Drop every edge touching one of `roles`. Returns the number of edges removed.
    pub fn remove_roles(&mut self, roles: &[NodeId]) -> usize {
        let before = self.permissions.len() + self.subjects.len();
        self.permissions.retain(|(r, _), id| *id == EdgeId::SENTINEL || !roles.contains(r));
        self.subjects.retain(|(_, r), _| !roles.contains(r));
        before - self.permissions.len() - self.subjects.len()
    }

    pub fn remove_permissions(&mut self, permissions: &[NodeId]) -> usize {
        let before = self.permissions.len();
        self.permissions.retain(|(_, p), id| *id == EdgeId::SENTINEL || !permissions.contains(p));
        before - self.permissions.len()
    }

    // ---- persistence ----

    pub fn permission_rows(&self) -> Vec<PermissionEdgeRow> {
        let mut rows: Vec<PermissionEdgeRow> = self.permissions.iter()
            .map(|((r, p), id)| PermissionEdgeRow { id: id.0, role_id: *r, permission_id: *p })
            .collect();
        rows.sort_by_key(|r| r.id);
        rows
    }

    pub fn subject_rows(&self) -> Vec<SubjectEdgeRow> {
        let mut rows: Vec<SubjectEdgeRow> = self.subjects.iter()
            .map(|((s, r), e)| SubjectEdgeRow { id: e.id.0, role_id: *r, subject_id: s.to_string(), constraint: e.constraint.clone() })
            .collect();
        rows.sort_by_key(|r| r.id);
        rows
    }

    pub fn next_permission_edge(&self) -> u64 { self.next_permission_edge }
    pub fn next_subject_edge(&self) -> u64 { self.next_subject_edge }

    /// Rebuild from persisted rows, checking every edge against the partitions it refers to.
    pub fn from_rows(
        permission_rows: Vec<PermissionEdgeRow>,
        next_permission_edge: u64,
        subject_rows: Vec<SubjectEdgeRow>,
        next_subject_edge: u64,
        roles: &NestedSet,
        perms: &NestedSet,
    ) -> Result<Self> {
        let dangling = |what: &str, edge: u64, id: NodeId| RbacError::storage("dangling_edge", format!("{} edge {} refers to missing node {}", what, edge, id));
        let mut out = Self { permissions: BTreeMap::new(), subjects: BTreeMap::new(), next_permission_edge, next_subject_edge };
        let mut seen = std::collections::HashSet::new();
        for row in permission_rows {
            if !roles.contains_id(row.role_id) { return Err(dangling("permission", row.id, row.role_id)); }
            if !perms.contains_id(row.permission_id) { return Err(dangling("permission", row.id, row.permission_id)); }
            if row.id >= next_permission_edge {
                return Err(RbacError::storage("stale_counter", format!("permission edge {} is beyond counter {}", row.id, next_permission_edge)));
            }
            if !seen.insert(row.id) || out.permissions.insert((row.role_id, row.permission_id), EdgeId(row.id)).is_some() {
                return Err(RbacError::conflict("duplicate_edge", format!("permission edge {} duplicates an existing edge", row.id)));
            }
        }
        seen.clear();
        for row in subject_rows {
            if !roles.contains_id(row.role_id) { return Err(dangling("subject", row.id, row.role_id)); }
            if row.id >= next_subject_edge {
                return Err(RbacError::storage("stale_counter", format!("subject edge {} is beyond counter {}", row.id, next_subject_edge)));
            }
            let edge = SubjectEdge { id: EdgeId(row.id), constraint: row.constraint };
            if !seen.insert(row.id) || out.subjects.insert((SubjectId::from(row.subject_id), row.role_id), edge).is_some() {
                return Err(RbacError::conflict("duplicate_edge", format!("subject edge {} duplicates an existing edge", row.id)));
            }
        }
        Ok(out)
    }
}

/// The shared, lock-protected edge relations.
///
/// Read access is public. Edges are only written through `Rbac` transactions, which
/// check node existence and keep edges in step with structural changes.
pub struct AssignmentGraph {
    edges: RwLock<EdgeSet>,
    lock_timeout: Duration,
}

impl AssignmentGraph {
    pub fn new(lock_timeout: Duration) -> Self { Self { edges: RwLock::new(EdgeSet::new()), lock_timeout } }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, EdgeSet>> {
        self.edges.try_read_for(self.lock_timeout).ok_or_else(|| self.timeout("read"))
    }

    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, EdgeSet>> {
        self.edges.try_write_for(self.lock_timeout).ok_or_else(|| self.timeout("write"))
    }

    fn timeout(&self, mode: &str) -> RbacError {
        warn!(target: "rbacstore::assignments", "{} lock on assignments timed out after {:?}", mode, self.lock_timeout);
        RbacError::busy("lock_timeout", format!("{} lock on assignments not acquired within {} ms", mode, self.lock_timeout.as_millis()))
    }

    pub fn has_direct_edge(&self, role: NodeId, permission: NodeId) -> Result<bool> {
        Ok(self.read()?.permission_edge(role, permission).is_some())
    }

    pub fn role_permissions(&self, role: NodeId) -> Result<Vec<NodeId>> { Ok(self.read()?.role_permissions(role)) }
    pub fn permission_roles(&self, permission: NodeId) -> Result<Vec<NodeId>> { Ok(self.read()?.permission_roles(permission)) }
    pub fn subject_roles<S: Into<SubjectId>>(&self, subject: S) -> Result<Vec<NodeId>> { Ok(self.read()?.subject_roles(&subject.into())) }
    pub fn role_subjects(&self, role: NodeId) -> Result<Vec<SubjectId>> { Ok(self.read()?.role_subjects(role)) }
    pub fn has_role<S: Into<SubjectId>>(&self, role: NodeId, subject: S) -> Result<bool> { Ok(self.read()?.has_role(role, &subject.into())) }
    pub fn role_count<S: Into<SubjectId>>(&self, subject: S) -> Result<usize> { Ok(self.read()?.role_count(&subject.into())) }

    pub fn snapshot(&self) -> Result<EdgeSet> { Ok(self.read()?.clone()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trees() -> (NestedSet, NestedSet, NodeId, NodeId) {
        let mut roles = NestedSet::new();
        let admin = roles.insert("admin", "", None).unwrap();
        let mut perms = NestedSet::new();
        let (_, del) = perms.insert_path("/posts/delete", &[]).unwrap();
        (roles, perms, admin, del)
    }

    fn graph() -> AssignmentGraph { AssignmentGraph::new(Duration::from_millis(50)) }

    #[test]
    fn fresh_graph_has_only_the_sentinel() {
        let g = graph();
        assert!(g.has_direct_edge(NodeId::ROOT, NodeId::ROOT).unwrap());
        assert!(g.role_permissions(NodeId::ROOT).unwrap().is_empty());
        assert!(g.permission_roles(NodeId::ROOT).unwrap().is_empty());
        assert_eq!(g.read().unwrap().permission_rows()[0].id, EdgeId::SENTINEL.0);
    }

    #[test]
    fn duplicate_assign_returns_existing_edge() {
        let (_, _, admin, del) = trees();
        let mut e = EdgeSet::new();
        let e1 = e.assign(admin, del);
        assert_eq!(e1, EdgeId(2));
        assert_eq!(e.assign(admin, del), e1);
        assert_eq!(e.permission_rows().len(), 2);
        assert_eq!(e.role_permissions(admin), vec![del]);
        assert_eq!(e.permission_roles(del), vec![admin]);
    }

    #[test]
    fn unassign_absent_is_a_no_op() {
        let (_, _, admin, del) = trees();
        let mut e = EdgeSet::new();
        assert!(!e.unassign(admin, del));
        assert!(!e.unassign_subject(admin, &"nobody".into()));
    }

    #[test]
    fn subject_edges_keep_the_first_constraint() {
        let (_, _, admin, _) = trees();
        let g = graph();
        {
            let mut e = g.write().unwrap();
            let e1 = e.assign_subject(admin, 105u64.into(), Some("office hours".into()));
            let e2 = e.assign_subject(admin, "105".into(), None);
            assert_eq!(e1, e2);
            assert_eq!(e.subject_edge(admin, &"105".into()).unwrap().constraint.as_deref(), Some("office hours"));
        }
        assert!(g.has_role(admin, 105u64).unwrap());
        assert_eq!(g.role_count("105").unwrap(), 1);
        assert_eq!(g.role_subjects(admin).unwrap(), vec![SubjectId::from("105")]);
        assert!(g.write().unwrap().unassign_subject(admin, &"105".into()));
        assert_eq!(g.role_count("105").unwrap(), 0);
    }

    #[test]
    fn cascade_removal_spares_the_sentinel() {
        let (_, _, admin, del) = trees();
        let mut e = EdgeSet::new();
        e.assign(admin, del);
        e.assign(NodeId::ROOT, del);
        e.assign_subject(admin, "u1".into(), None);
        assert_eq!(e.remove_roles(&[admin]), 2);
        assert_eq!(e.remove_permissions(&[del, NodeId::ROOT]), 1);
        assert!(e.permission_edge(NodeId::ROOT, NodeId::ROOT).is_some());
    }

    #[test]
    fn held_write_lock_makes_readers_busy() {
        let g = std::sync::Arc::new(graph());
        let guard = g.write().unwrap();
        let g2 = g.clone();
        let err = std::thread::spawn(move || g2.role_count("u")).join().unwrap().unwrap_err();
        assert!(err.is_busy());
        drop(guard);
        assert_eq!(g.role_count("u").unwrap(), 0);
    }

    #[test]
    fn rows_rebuild_and_reject_dangling_edges() {
        let (roles, perms, admin, del) = trees();
        let mut e = EdgeSet::new();
        e.assign(admin, del);
        e.assign_subject(admin, "u".into(), Some("c".into()));
        let back = EdgeSet::from_rows(e.permission_rows(), e.next_permission_edge(), e.subject_rows(), e.next_subject_edge(), &roles, &perms).unwrap();
        assert_eq!(back, e);

        let mut rows = e.permission_rows();
        rows.push(PermissionEdgeRow { id: 2, role_id: NodeId::ROOT, permission_id: del });
        let err = EdgeSet::from_rows(rows, 9, vec![], 1, &roles, &perms).unwrap_err();
        assert_eq!(err.code_str(), "duplicate_edge");

        let bad = vec![PermissionEdgeRow { id: 2, role_id: NodeId(77), permission_id: del }];
        assert_eq!(EdgeSet::from_rows(bad, 3, vec![], 1, &roles, &perms).unwrap_err().code_str(), "dangling_edge");
    }
}
