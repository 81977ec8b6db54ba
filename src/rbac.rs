//! The authority store facade.
//!
//! `Rbac` owns both partitions, the assignment graph and the configuration. Operations
//! that touch more than one resource, or any mutation while autosave is on, run as a
//! transaction: locks are taken in the global order Roles, Permissions, Assignments;
//! written resources are staged copies; the snapshot (when autosave is on) is written
//! before the staged copies are published, so a failed save leaves memory untouched.

use std::path::{Path, PathBuf};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RbacConfig;
use crate::error::{RbacError, Result};
use crate::identity::{AssignmentGraph, Authorizer, EdgeId, EdgeSet, Grant, SubjectId};
use crate::storage::snapshot::{now_ms, PartitionImage, Snapshot, SNAPSHOT_VERSION};
use crate::storage::{EntityRef, NestedSet, NodeId, Partition, PartitionKind};

/// Everything a caller usually wants to know about one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    pub id: NodeId,
    pub title: String,
    pub description: String,
    pub path: String,
    pub depth: u64,
    pub parent: Option<NodeId>,
    pub left: i64,
    pub right: i64,
}

impl NodeInfo {
    fn from_set(set: &NestedSet, id: NodeId) -> Result<Self> {
        let n = set.get(id)?;
        Ok(Self {
            id,
            title: n.title.clone(),
            description: n.description.clone(),
            path: set.path_string(id)?,
            depth: set.depth(id)?,
            parent: set.parent(id)?,
            left: n.left,
            right: n.right,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Skip,
    Read,
    Write,
}

/// One resource inside a transaction.
enum Slot<'a, T> {
    Skip,
    Read(RwLockReadGuard<'a, T>),
    Write(RwLockWriteGuard<'a, T>, T),
}

fn not_held(what: &str) -> RbacError {
    RbacError::storage("lock_not_held", format!("transaction does not hold {}", what))
}

impl<'a, T: Clone> Slot<'a, T> {
    fn open<R, W>(access: Access, read: R, write: W) -> Result<Self>
    where
        R: FnOnce() -> Result<RwLockReadGuard<'a, T>>,
        W: FnOnce() -> Result<RwLockWriteGuard<'a, T>>,
    {
        Ok(match access {
            Access::Skip => Slot::Skip,
            Access::Read => Slot::Read(read()?),
            Access::Write => {
                let guard = write()?;
                let staged = (*guard).clone();
                Slot::Write(guard, staged)
            }
        })
    }

    fn view(&self, what: &str) -> Result<&T> {
        match self {
            Slot::Read(g) => Ok(&**g),
            Slot::Write(_, staged) => Ok(staged),
            Slot::Skip => Err(not_held(what)),
        }
    }

    fn stage(&mut self, what: &str) -> Result<&mut T> {
        match self {
            Slot::Write(_, staged) => Ok(staged),
            _ => Err(not_held(what)),
        }
    }

    fn publish(self) {
        if let Slot::Write(mut guard, staged) = self {
            *guard = staged;
        }
    }
}

struct Tx<'a> {
    roles: Slot<'a, NestedSet>,
    permissions: Slot<'a, NestedSet>,
    edges: Slot<'a, EdgeSet>,
}

impl<'a> Tx<'a> {
    fn set(&self, kind: PartitionKind) -> Result<&NestedSet> {
        match kind {
            PartitionKind::Roles => self.roles.view("roles"),
            PartitionKind::Permissions => self.permissions.view("permissions"),
        }
    }

    fn set_mut(&mut self, kind: PartitionKind) -> Result<&mut NestedSet> {
        match kind {
            PartitionKind::Roles => self.roles.stage("roles"),
            PartitionKind::Permissions => self.permissions.stage("permissions"),
        }
    }

    fn edges(&self) -> Result<&EdgeSet> { self.edges.view("assignments") }
    fn edges_mut(&mut self) -> Result<&mut EdgeSet> { self.edges.stage("assignments") }

    fn snapshot(&self) -> Result<Snapshot> {
        let edges = self.edges()?;
        Ok(Snapshot {
            version: SNAPSHOT_VERSION,
            created_ms: now_ms(),
            roles: PartitionImage::from_set(self.set(PartitionKind::Roles)?),
            permissions: PartitionImage::from_set(self.set(PartitionKind::Permissions)?),
            role_permissions: edges.permission_rows(),
            next_permission_edge_id: edges.next_permission_edge(),
            subject_roles: edges.subject_rows(),
            next_subject_edge_id: edges.next_subject_edge(),
        })
    }

    fn publish(self) {
        self.roles.publish();
        self.permissions.publish();
        self.edges.publish();
    }
}

fn on(kind: PartitionKind, access: Access) -> (Access, Access) {
    match kind {
        PartitionKind::Roles => (access, Access::Skip),
        PartitionKind::Permissions => (Access::Skip, access),
    }
}

pub struct Rbac {
    config: RbacConfig,
    root: Option<PathBuf>,
    roles: Partition,
    permissions: Partition,
    assignments: AssignmentGraph,
}

impl Rbac {
    /// In-memory store. Autosave needs a root directory and is ignored here.
    pub fn new(config: RbacConfig) -> Self {
        let timeout = config.lock_timeout();
        Self {
            roles: Partition::new(PartitionKind::Roles, timeout),
            permissions: Partition::new(PartitionKind::Permissions, timeout),
            assignments: AssignmentGraph::new(timeout),
            root: None,
            config,
        }
    }

    /// Store rooted at `root` (created if missing). An existing snapshot is loaded.
    pub fn with_root<P: Into<PathBuf>>(config: RbacConfig, root: P) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let mut rbac = Self::new(config);
        rbac.root = Some(root);
        rbac.load()?;
        Ok(rbac)
    }

    /// `with_root` using `<root>/rbac.json` plus environment overrides.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        let config = RbacConfig::load(root)?;
        Self::with_root(config, root)
    }

    pub fn config(&self) -> &RbacConfig { &self.config }
    pub fn root(&self) -> Option<&Path> { self.root.as_deref() }
    pub fn roles(&self) -> &Partition { &self.roles }
    pub fn permissions(&self) -> &Partition { &self.permissions }
    pub fn assignments(&self) -> &AssignmentGraph { &self.assignments }

    pub fn partition(&self, kind: PartitionKind) -> &Partition {
        match kind {
            PartitionKind::Roles => &self.roles,
            PartitionKind::Permissions => &self.permissions,
        }
    }

    pub fn authorizer(&self) -> Authorizer<'_> {
        Authorizer::new(&self.roles, &self.permissions, &self.assignments, self.config.role_inheritance)
    }

    fn autosave(&self) -> bool { self.config.autosave && self.root.is_some() }

    pub fn snapshot_path(&self) -> Result<PathBuf> {
        self.root.as_deref()
            .map(|r| self.config.snapshot_path(r))
            .ok_or_else(|| RbacError::invalid("no_root", "store has no root directory"))
    }

    // ---- transactions ----

    fn lock(&self, roles: Access, permissions: Access, edges: Access) -> Result<Tx<'_>> {
        let roles = Slot::open(roles, || self.roles.read(), || self.roles.write())?;
        let permissions = Slot::open(permissions, || self.permissions.read(), || self.permissions.write())?;
        let edges = Slot::open(edges, || self.assignments.read(), || self.assignments.write())?;
        Ok(Tx { roles, permissions, edges })
    }

    /// Run `f` against staged copies and publish them, persisting first under autosave.
    fn transact<T, F>(&self, roles: Access, permissions: Access, edges: Access, f: F) -> Result<T>
    where
        F: FnOnce(&mut Tx<'_>) -> Result<T>,
    {
        let lift = |a: Access| if self.autosave() && a == Access::Skip { Access::Read } else { a };
        let mut tx = self.lock(lift(roles), lift(permissions), lift(edges))?;
        let out = f(&mut tx)?;
        if self.autosave() {
            let path = self.snapshot_path()?;
            if let Err(e) = tx.snapshot()?.write_to(&path) {
                warn!(target: "rbacstore::rbac", "autosave to {} failed, rolling back: {}", path.display(), e);
                return Err(e);
            }
        }
        tx.publish();
        Ok(out)
    }

    fn transact_on<T, F>(&self, kind: PartitionKind, edges: Access, f: F) -> Result<T>
    where
        F: FnOnce(&mut Tx<'_>) -> Result<T>,
    {
        let (r, p) = on(kind, Access::Write);
        self.transact(r, p, edges, f)
    }

    // ---- entity operations ----

    pub fn resolve(&self, kind: PartitionKind, node: &EntityRef) -> Result<NodeId> {
        let set = self.partition(kind).read()?;
        node.resolve(&set)
    }

    pub fn describe(&self, kind: PartitionKind, node: &EntityRef) -> Result<NodeInfo> {
        let set = self.partition(kind).read()?;
        NodeInfo::from_set(&set, node.resolve(&set)?)
    }

    pub fn insert(&self, kind: PartitionKind, title: &str, description: &str, parent: Option<&EntityRef>) -> Result<NodeId> {
        self.transact_on(kind, Access::Skip, |tx| {
            let set = tx.set_mut(kind)?;
            let parent = match parent {
                Some(p) => Some(p.resolve(set).map_err(|e| {
                    if e.is_not_found() { RbacError::invalid("parent_not_found", e.message().to_string()) } else { e }
                })?),
                None => None,
            };
            set.insert(title, description, parent)
        })
    }

    pub fn insert_path(&self, kind: PartitionKind, path: &str, descriptions: &[String]) -> Result<u64> {
        self.insert_path_id(kind, path, descriptions).map(|(created, _)| created)
    }

    pub fn insert_path_id(&self, kind: PartitionKind, path: &str, descriptions: &[String]) -> Result<(u64, NodeId)> {
        self.transact_on(kind, Access::Skip, |tx| tx.set_mut(kind)?.insert_path(path, descriptions))
    }

    /// Retitle a node in place. Without a description the current one is kept.
    pub fn edit(&self, kind: PartitionKind, node: &EntityRef, title: &str, description: Option<&str>) -> Result<NodeId> {
        self.transact_on(kind, Access::Skip, |tx| {
            let set = tx.set_mut(kind)?;
            let id = node.resolve(set)?;
            let description = match description {
                Some(d) => d.to_string(),
                None => set.get(id)?.description.clone(),
            };
            set.edit(id, title, &description)?;
            Ok(id)
        })
    }

    /// Remove a node (children move up) or, when `recursive`, its whole subtree, together
    /// with every edge referring to a removed node. Returns the removed ids.
    pub fn remove(&self, kind: PartitionKind, node: &EntityRef, recursive: bool) -> Result<Vec<NodeId>> {
        self.transact_on(kind, Access::Write, |tx| {
            let set = tx.set_mut(kind)?;
            let id = node.resolve(set)?;
            let removed = if recursive {
                set.remove_subtree(id)?
            } else {
                set.remove(id)?;
                vec![id]
            };
            let edges = tx.edges_mut()?;
            let dropped = match kind {
                PartitionKind::Roles => edges.remove_roles(&removed),
                PartitionKind::Permissions => edges.remove_permissions(&removed),
            };
            debug!(target: "rbacstore::rbac", "removed {} {} node(s) from {} and {} edge(s)", removed.len(), if recursive { "subtree" } else { "single" }, kind, dropped);
            Ok(removed)
        })
    }

    // ---- assignments ----

    pub fn assign(&self, role: &EntityRef, permission: &EntityRef) -> Result<EdgeId> {
        self.transact(Access::Read, Access::Read, Access::Write, |tx| {
            let r = role.resolve(tx.set(PartitionKind::Roles)?)?;
            let p = permission.resolve(tx.set(PartitionKind::Permissions)?)?;
            Ok(tx.edges_mut()?.assign(r, p))
        })
    }

    pub fn unassign(&self, role: &EntityRef, permission: &EntityRef) -> Result<bool> {
        self.transact(Access::Read, Access::Read, Access::Write, |tx| {
            let r = role.resolve(tx.set(PartitionKind::Roles)?)?;
            let p = permission.resolve(tx.set(PartitionKind::Permissions)?)?;
            Ok(tx.edges_mut()?.unassign(r, p))
        })
    }

    pub fn assign_subject<S: Into<SubjectId>>(&self, role: &EntityRef, subject: S, constraint: Option<String>) -> Result<EdgeId> {
        let subject = subject.into();
        self.transact(Access::Read, Access::Skip, Access::Write, |tx| {
            let r = role.resolve(tx.set(PartitionKind::Roles)?)?;
            Ok(tx.edges_mut()?.assign_subject(r, subject, constraint))
        })
    }

    pub fn unassign_subject<S: Into<SubjectId>>(&self, role: &EntityRef, subject: S) -> Result<bool> {
        let subject = subject.into();
        self.transact(Access::Read, Access::Skip, Access::Write, |tx| {
            let r = role.resolve(tx.set(PartitionKind::Roles)?)?;
            Ok(tx.edges_mut()?.unassign_subject(r, &subject))
        })
    }

    pub fn role_permissions(&self, role: &EntityRef) -> Result<Vec<NodeId>> {
        let tx = self.lock(Access::Read, Access::Skip, Access::Read)?;
        Ok(tx.edges()?.role_permissions(role.resolve(tx.set(PartitionKind::Roles)?)?))
    }

    pub fn permission_roles(&self, permission: &EntityRef) -> Result<Vec<NodeId>> {
        let tx = self.lock(Access::Skip, Access::Read, Access::Read)?;
        Ok(tx.edges()?.permission_roles(permission.resolve(tx.set(PartitionKind::Permissions)?)?))
    }

    pub fn role_subjects(&self, role: &EntityRef) -> Result<Vec<SubjectId>> {
        let tx = self.lock(Access::Read, Access::Skip, Access::Read)?;
        Ok(tx.edges()?.role_subjects(role.resolve(tx.set(PartitionKind::Roles)?)?))
    }

    pub fn has_role<S: Into<SubjectId>>(&self, role: &EntityRef, subject: S) -> Result<bool> {
        let tx = self.lock(Access::Read, Access::Skip, Access::Read)?;
        Ok(tx.edges()?.has_role(role.resolve(tx.set(PartitionKind::Roles)?)?, &subject.into()))
    }

    pub fn subject_roles<S: Into<SubjectId>>(&self, subject: S) -> Result<Vec<NodeId>> { self.assignments.subject_roles(subject) }
    pub fn role_count<S: Into<SubjectId>>(&self, subject: S) -> Result<usize> { self.assignments.role_count(subject) }

    // ---- authorization ----

    pub fn check<S: Into<SubjectId>>(&self, permission: &EntityRef, subject: S) -> Result<bool> { self.authorizer().check(permission, subject) }
    pub fn explain<S: Into<SubjectId>>(&self, permission: &EntityRef, subject: S) -> Result<Option<Grant>> { self.authorizer().explain(permission, subject) }
    pub fn all_roles<S: Into<SubjectId>>(&self, subject: S, scope: Option<&EntityRef>) -> Result<Vec<NodeId>> { self.authorizer().all_roles(subject, scope) }
    pub fn role_has_permission(&self, role: &EntityRef, permission: &EntityRef) -> Result<bool> { self.authorizer().role_has_permission(role, permission) }

    // ---- resets ----

    fn confirm(op: &str, confirmed: bool) -> Result<()> {
        if confirmed { return Ok(()); }
        warn!(target: "rbacstore::rbac", "{} rejected: not confirmed", op);
        Err(RbacError::confirm_required(op))
    }

    /// Reset one partition to its sentinel root and drop the edges of its removed nodes.
    pub fn reset(&self, kind: PartitionKind, confirmed: bool) -> Result<()> {
        Self::confirm("reset", confirmed)?;
        self.transact_on(kind, Access::Write, |tx| {
            let set = tx.set_mut(kind)?;
            let gone: Vec<NodeId> = set.rows().iter().skip(1).map(|n| n.id).collect();
            *set = NestedSet::new();
            let edges = tx.edges_mut()?;
            match kind {
                PartitionKind::Roles => edges.remove_roles(&gone),
                PartitionKind::Permissions => edges.remove_permissions(&gone),
            };
            Ok(())
        })?;
        info!(target: "rbacstore::rbac", "{} reset to sentinel root", kind);
        Ok(())
    }

    pub fn reset_assignments(&self, confirmed: bool) -> Result<()> {
        Self::confirm("reset_assignments", confirmed)?;
        self.transact(Access::Skip, Access::Skip, Access::Write, |tx| {
            *tx.edges_mut()? = EdgeSet::new();
            Ok(())
        })?;
        info!(target: "rbacstore::rbac", "assignments reset to sentinel edge");
        Ok(())
    }

    pub fn reset_all(&self, confirmed: bool) -> Result<()> {
        Self::confirm("reset_all", confirmed)?;
        self.transact(Access::Write, Access::Write, Access::Write, |tx| {
            *tx.set_mut(PartitionKind::Roles)? = NestedSet::new();
            *tx.set_mut(PartitionKind::Permissions)? = NestedSet::new();
            *tx.edges_mut()? = EdgeSet::new();
            Ok(())
        })?;
        info!(target: "rbacstore::rbac", "store reset");
        Ok(())
    }

    // ---- persistence ----

    /// Consistent image of the whole store.
    pub fn snapshot(&self) -> Result<Snapshot> {
        self.lock(Access::Read, Access::Read, Access::Read)?.snapshot()
    }

    pub fn save_snapshot(&self, path: &Path) -> Result<()> { self.snapshot()?.write_to(path) }

    /// Validate the image completely before any lock is taken, then swap it in.
    pub fn restore(&self, snap: Snapshot) -> Result<()> {
        let roles = snap.roles.into_set()?;
        let permissions = snap.permissions.into_set()?;
        let edges = EdgeSet::from_rows(snap.role_permissions, snap.next_permission_edge_id, snap.subject_roles, snap.next_subject_edge_id, &roles, &permissions)?;
        let mut tx = self.lock(Access::Write, Access::Write, Access::Write)?;
        *tx.set_mut(PartitionKind::Roles)? = roles;
        *tx.set_mut(PartitionKind::Permissions)? = permissions;
        *tx.edges_mut()? = edges;
        tx.publish();
        Ok(())
    }

    pub fn load_snapshot(&self, path: &Path) -> Result<()> {
        let snap = Snapshot::read_from(path)?;
        let created_ms = snap.created_ms;
        self.restore(snap)?;
        info!(target: "rbacstore::rbac", "loaded snapshot {} (created_ms={})", path.display(), created_ms);
        Ok(())
    }

    /// Write the snapshot under the root directory.
    pub fn save(&self) -> Result<PathBuf> {
        let path = self.snapshot_path()?;
        self.save_snapshot(&path)?;
        Ok(path)
    }

    /// Load the snapshot under the root directory. Returns false when none exists yet.
    pub fn load(&self) -> Result<bool> {
        let path = self.snapshot_path()?;
        if !path.exists() { return Ok(false); }
        self.load_snapshot(&path)?;
        Ok(true)
    }
}

impl Default for Rbac {
    fn default() -> Self { Self::new(RbacConfig::default()) }
}

#[cfg(test)]
#[path = "rbac_tests.rs"]
mod rbac_tests;
