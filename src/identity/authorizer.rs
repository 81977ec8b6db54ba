use serde::Serialize;
use tracing::debug;

use super::assignments::{AssignmentGraph, EdgeId, EdgeSet};
use super::principal::SubjectId;
use crate::config::RoleInheritance;
use crate::error::Result;
use crate::storage::{EntityRef, NestedSet, NodeId, Partition};

/// Why a check succeeded: the role granted to the subject, the role owning the edge (the
/// same role unless inherited), and the permission the edge points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Grant {
    pub subject_role: NodeId,
    pub role: NodeId,
    pub permission: NodeId,
    pub edge: EdgeId,
}

/// Read-only authorization queries over both partitions and the edge relations.
///
/// Every query takes read guards in the global order Roles, Permissions, Assignments and
/// holds them for the whole evaluation.
pub struct Authorizer<'a> {
    roles: &'a Partition,
    permissions: &'a Partition,
    assignments: &'a AssignmentGraph,
    inheritance: RoleInheritance,
}

/// Roles whose assignments count for a holder of `direct`, in evaluation order, each paired
/// with the directly held role it came from.
fn effective_roles(roles: &NestedSet, direct: &[NodeId], inheritance: RoleInheritance) -> Result<Vec<(NodeId, NodeId)>> {
    let mut out: Vec<(NodeId, NodeId)> = Vec::new();
    for d in direct {
        match inheritance {
            RoleInheritance::None => out.push((*d, *d)),
            RoleInheritance::Descendants => {
                for r in roles.subtree_ids(*d)? {
                    if !out.iter().any(|(_, seen)| *seen == r) { out.push((*d, r)); }
                }
            }
        }
    }
    Ok(out)
}

/// First non-sentinel edge from one of `candidates` to `target` or one of its ancestors.
fn find_grant(perms: &NestedSet, edges: &EdgeSet, candidates: &[(NodeId, NodeId)], target: NodeId) -> Result<Option<Grant>> {
    let target = perms.get(target)?;
    for (subject_role, role) in candidates {
        for (p, edge) in edges.permission_edges_of(*role) {
            if edge == EdgeId::SENTINEL { continue; }
            let Ok(granted) = perms.get(p) else { continue };
            if granted.contains(target) {
                return Ok(Some(Grant { subject_role: *subject_role, role: *role, permission: p, edge }));
            }
        }
    }
    Ok(None)
}

impl<'a> Authorizer<'a> {
    pub fn new(roles: &'a Partition, permissions: &'a Partition, assignments: &'a AssignmentGraph, inheritance: RoleInheritance) -> Self {
        Self { roles, permissions, assignments, inheritance }
    }

    pub fn inheritance(&self) -> RoleInheritance { self.inheritance }

    pub fn has_direct_edge(&self, role: NodeId, permission: NodeId) -> Result<bool> {
        self.assignments.has_direct_edge(role, permission)
    }

    /// True iff a role held by `subject` has an edge to the permission or to one of its
    /// ancestors.
    pub fn check<S: Into<SubjectId>>(&self, permission: &EntityRef, subject: S) -> Result<bool> {
        Ok(self.explain(permission, subject)?.is_some())
    }

    pub fn check_id<S: Into<SubjectId>>(&self, permission: NodeId, subject: S) -> Result<bool> {
        self.check(&EntityRef::Id(permission), subject)
    }

    pub fn explain<S: Into<SubjectId>>(&self, permission: &EntityRef, subject: S) -> Result<Option<Grant>> {
        let subject = subject.into();
        let roles = self.roles.read()?;
        let perms = self.permissions.read()?;
        let edges = self.assignments.read()?;
        let target = permission.resolve(&perms)?;
        let direct = edges.subject_roles(&subject);
        let candidates = effective_roles(&roles, &direct, self.inheritance)?;
        let grant = find_grant(&perms, &edges, &candidates, target)?;
        match &grant {
            Some(g) => debug!(target: "rbacstore::authorizer", "check {} for {}: granted by role {} via permission {} (edge {})", permission, subject, g.role, g.permission, g.edge),
            None => debug!(target: "rbacstore::authorizer", "check {} for {}: denied ({} direct roles)", permission, subject, direct.len()),
        }
        Ok(grant)
    }

    /// Roles directly granted to `subject`, optionally limited to the subtree of `scope`
    /// (scope included).
    pub fn all_roles<S: Into<SubjectId>>(&self, subject: S, scope: Option<&EntityRef>) -> Result<Vec<NodeId>> {
        let subject = subject.into();
        let roles = self.roles.read()?;
        let edges = self.assignments.read()?;
        let direct = edges.subject_roles(&subject);
        let Some(scope) = scope else { return Ok(direct) };
        let scope = roles.get(scope.resolve(&roles)?)?;
        let mut out = Vec::new();
        for r in direct {
            if scope.contains(roles.get(r)?) { out.push(r); }
        }
        Ok(out)
    }

    /// The ancestor rule of `check` applied to a single role, honouring the inheritance
    /// policy.
    pub fn role_has_permission(&self, role: &EntityRef, permission: &EntityRef) -> Result<bool> {
        let roles = self.roles.read()?;
        let perms = self.permissions.read()?;
        let edges = self.assignments.read()?;
        let role = role.resolve(&roles)?;
        let target = permission.resolve(&perms)?;
        let candidates = effective_roles(&roles, &[role], self.inheritance)?;
        Ok(find_grant(&perms, &edges, &candidates, target)?.is_some())
    }
}
