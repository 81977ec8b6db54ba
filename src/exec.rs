//! Run parsed commands against a store and shape the results as JSON.

use serde_json::{json, Value};
use tracing::debug;

use crate::command::{self, Command, ResetTarget};
use crate::error::Result;
use crate::rbac::Rbac;
use crate::storage::{NodeId, PartitionKind, PathEntry};

fn ok(results: Value) -> Value { json!({ "status": "ok", "results": results }) }

fn entries(list: &[PathEntry]) -> Value {
    Value::Array(list.iter().map(|e| json!({ "id": e.id, "title": e.title, "description": e.description, "depth": e.depth })).collect())
}

/// Titled rows for a list of ids in one partition.
fn nodes(rbac: &Rbac, kind: PartitionKind, ids: &[NodeId]) -> Result<Value> {
    let set = rbac.partition(kind).read()?;
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        let n = set.get(*id)?;
        out.push(json!({ "id": id, "title": n.title, "path": set.path_string(*id)? }));
    }
    Ok(Value::Array(out))
}

/// Parse and execute one line of command text.
pub fn execute_text(rbac: &Rbac, input: &str) -> Result<Value> {
    let cmd = command::parse(input)?;
    execute(rbac, &cmd)
}

pub fn execute(rbac: &Rbac, cmd: &Command) -> Result<Value> {
    debug!(target: "rbacstore::exec", "execute {:?}", cmd);
    let results = match cmd {
        Command::Add { kind, title, description, parent } => {
            let id = rbac.insert(*kind, title, description, parent.as_ref())?;
            json!({ "id": id })
        }
        Command::AddPath { kind, path, descriptions } => {
            let (created, id) = rbac.insert_path_id(*kind, path, descriptions)?;
            json!({ "created": created, "id": id })
        }
        Command::Remove { kind, node, recursive } => {
            let removed = rbac.remove(*kind, node, *recursive)?;
            json!({ "removed": removed })
        }
        Command::Edit { kind, node, title, description } => {
            let id = rbac.edit(*kind, node, title, description.as_deref())?;
            json!({ "id": id })
        }
        Command::Show { kind, node } => serde_json::to_value(rbac.describe(*kind, node)?)?,
        Command::Children { kind, node } => {
            let set = rbac.partition(*kind).read()?;
            entries(&set.children(node.resolve(&set)?)?)
        }
        Command::Descendants { kind, node, absolute } => {
            let set = rbac.partition(*kind).read()?;
            entries(&set.descendants(node.resolve(&set)?, *absolute)?)
        }
        Command::Path { kind, node } => {
            let set = rbac.partition(*kind).read()?;
            let id = node.resolve(&set)?;
            json!({ "path": set.path_string(id)?, "ancestors": entries(&set.ancestor_path(id)?) })
        }
        Command::Count { kind } => json!({ "count": rbac.partition(*kind).count()? }),
        Command::Assign { role, permission } => json!({ "edge": rbac.assign(role, permission)? }),
        Command::Unassign { role, permission } => json!({ "removed": rbac.unassign(role, permission)? }),
        Command::Grant { role, subject, constraint } => json!({ "edge": rbac.assign_subject(role, subject, constraint.clone())? }),
        Command::Revoke { role, subject } => json!({ "removed": rbac.unassign_subject(role, subject)? }),
        Command::Check { permission, subject } => json!({ "allowed": rbac.check(permission, subject)? }),
        Command::Explain { permission, subject } => match rbac.explain(permission, subject)? {
            Some(g) => json!({ "allowed": true, "grant": g }),
            None => json!({ "allowed": false }),
        },
        Command::Roles { subject, scope } => nodes(rbac, PartitionKind::Roles, &rbac.all_roles(subject, scope.as_ref())?)?,
        Command::Permissions { role } => nodes(rbac, PartitionKind::Permissions, &rbac.role_permissions(role)?)?,
        Command::Reset { target, confirmed } => {
            match target {
                ResetTarget::Roles => rbac.reset(PartitionKind::Roles, *confirmed)?,
                ResetTarget::Permissions => rbac.reset(PartitionKind::Permissions, *confirmed)?,
                ResetTarget::Assignments => rbac.reset_assignments(*confirmed)?,
                ResetTarget::All => rbac.reset_all(*confirmed)?,
            }
            json!({ "reset": target })
        }
        Command::Save => json!({ "saved": rbac.save()?.display().to_string() }),
        Command::Load => json!({ "loaded": rbac.load()? }),
    };
    Ok(ok(results))
}
