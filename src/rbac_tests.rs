use super::*;
use crate::config::RoleInheritance;

const R: PartitionKind = PartitionKind::Roles;
const P: PartitionKind = PartitionKind::Permissions;

fn r(s: &str) -> EntityRef { EntityRef::from(s) }

fn seeded() -> Rbac {
    let rbac = Rbac::default();
    rbac.insert(R, "editor", "Edits posts", None).unwrap();
    rbac.insert_path(P, "/posts/delete", &["All post actions".into()]).unwrap();
    rbac.assign(&r("editor"), &r("/posts")).unwrap();
    rbac.assign_subject(&r("editor"), 105u64, None).unwrap();
    rbac
}

#[test]
fn insert_under_reference_and_missing_parent() {
    let rbac = Rbac::default();
    let staff = rbac.insert(R, "staff", "", None).unwrap();
    let lead = rbac.insert(R, "lead", "", Some(&r("/staff"))).unwrap();
    assert_eq!(rbac.roles().parent(lead).unwrap(), Some(staff));
    let err = rbac.insert(R, "x", "", Some(&r("/nope"))).unwrap_err();
    assert!(err.is_invalid());
    assert_eq!(err.code_str(), "parent_not_found");
    assert_eq!(rbac.roles().count().unwrap(), 3);
}

#[test]
fn describe_reports_path_depth_and_parent() {
    let rbac = seeded();
    let info = rbac.describe(P, &r("delete")).unwrap();
    assert_eq!(info.path, "/posts/delete");
    assert_eq!(info.depth, 2);
    assert_eq!(info.parent, Some(rbac.resolve(P, &r("/posts")).unwrap()));
    assert_eq!(rbac.describe(P, &r("posts")).unwrap().description, "All post actions");
}

#[test]
fn check_unassign_round() {
    let rbac = seeded();
    assert!(rbac.check(&r("/posts/delete"), 105u64).unwrap());
    assert!(rbac.unassign(&r("editor"), &r("/posts")).unwrap());
    assert!(!rbac.check(&r("/posts/delete"), 105u64).unwrap());
    assert!(!rbac.unassign(&r("editor"), &r("/posts")).unwrap());
}

#[test]
fn removing_a_role_drops_its_edges() {
    let rbac = seeded();
    let removed = rbac.remove(R, &r("editor"), false).unwrap();
    assert_eq!(removed.len(), 1);
    assert_eq!(rbac.role_count(105u64).unwrap(), 0);
    assert!(rbac.permission_roles(&r("/posts")).unwrap().is_empty());
    assert!(!rbac.check(&r("/posts"), 105u64).unwrap());
}

#[test]
fn recursive_permission_removal_cascades() {
    let rbac = seeded();
    rbac.assign(&r("editor"), &r("/posts/delete")).unwrap();
    let removed = rbac.remove(P, &r("/posts"), true).unwrap();
    assert_eq!(removed.len(), 2);
    assert!(rbac.role_permissions(&r("editor")).unwrap().is_empty());
    assert_eq!(rbac.permissions().count().unwrap(), 1);
    assert!(rbac.assignments().has_direct_edge(NodeId::ROOT, NodeId::ROOT).unwrap());
}

#[test]
fn root_cannot_be_removed_through_the_facade() {
    let rbac = seeded();
    let err = rbac.remove(R, &EntityRef::Id(NodeId::ROOT), true).unwrap_err();
    assert_eq!(err.code_str(), "root_immutable");
}

#[test]
fn resets_need_confirmation() {
    let rbac = seeded();
    assert_eq!(rbac.reset(R, false).unwrap_err().code_str(), "confirm_required");
    assert_eq!(rbac.reset_assignments(false).unwrap_err().code_str(), "confirm_required");
    assert!(rbac.reset_all(false).unwrap_err().is_invalid());
    assert_eq!(rbac.roles().count().unwrap(), 2);
    assert!(rbac.check(&r("/posts"), 105u64).unwrap());
}

#[test]
fn partition_reset_drops_dangling_edges() {
    let rbac = seeded();
    rbac.reset(R, true).unwrap();
    assert_eq!(rbac.roles().count().unwrap(), 1);
    assert_eq!(rbac.role_count(105u64).unwrap(), 0);
    assert!(rbac.permission_roles(&r("/posts")).unwrap().is_empty());
    assert_eq!(rbac.insert(R, "again", "", None).unwrap(), NodeId(2));

    rbac.reset_all(true).unwrap();
    assert_eq!(rbac.permissions().count().unwrap(), 1);
    assert_eq!(rbac.snapshot().unwrap().role_permissions.len(), 1);
}

#[test]
fn reused_role_id_starts_without_edges() {
    let rbac = Rbac::default();
    let admin = rbac.insert(R, "admin", "", None).unwrap();
    rbac.insert(P, "secret", "", None).unwrap();
    rbac.assign(&r("admin"), &r("/secret")).unwrap();
    rbac.assign_subject(&r("admin"), "alice", None).unwrap();

    rbac.reset(R, true).unwrap();
    let guest = rbac.insert(R, "guest", "", None).unwrap();
    assert_eq!(guest, admin);
    assert!(!rbac.has_role(&r("guest"), "alice").unwrap());
    assert!(!rbac.check(&r("/secret"), "alice").unwrap());
    assert!(rbac.role_permissions(&r("guest")).unwrap().is_empty());
}

#[test]
fn removal_leaves_a_loadable_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    {
        let rbac = Rbac::with_root(RbacConfig::default(), dir.path()).unwrap();
        rbac.insert_path(R, "/staff/admin", &[]).unwrap();
        rbac.insert(P, "secret", "", None).unwrap();
        rbac.assign(&r("admin"), &r("secret")).unwrap();
        rbac.assign_subject(&r("admin"), "alice", None).unwrap();
        rbac.remove(R, &r("/staff"), true).unwrap();
        rbac.save().unwrap();
    }
    let rbac = Rbac::with_root(RbacConfig::default(), dir.path()).unwrap();
    assert_eq!(rbac.roles().count().unwrap(), 1);
    assert_eq!(rbac.role_count("alice").unwrap(), 0);
    assert!(!rbac.check(&r("secret"), "alice").unwrap());
}

#[test]
fn inheritance_follows_configuration() {
    let cfg = RbacConfig { role_inheritance: RoleInheritance::Descendants, ..RbacConfig::default() };
    let rbac = Rbac::new(cfg);
    rbac.insert_path(R, "/staff/moderator", &[]).unwrap();
    rbac.insert_path(P, "/users/ban", &[]).unwrap();
    rbac.assign(&r("moderator"), &r("/users/ban")).unwrap();
    rbac.assign_subject(&r("staff"), "lead", None).unwrap();
    assert!(rbac.check(&r("ban"), "lead").unwrap());
    assert_eq!(rbac.all_roles("lead", None).unwrap(), vec![rbac.resolve(R, &r("staff")).unwrap()]);
}

#[test]
fn snapshot_round_trip_restores_queries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("copy.snapshot");
    let rbac = seeded();
    rbac.assign_subject(&r("editor"), "alice", Some("weekdays".into())).unwrap();
    rbac.save_snapshot(&path).unwrap();

    let other = Rbac::default();
    other.load_snapshot(&path).unwrap();
    assert!(other.check(&r("/posts/delete"), 105u64).unwrap());
    assert!(other.has_role(&r("editor"), "alice").unwrap());
    assert_eq!(other.role_subjects(&r("editor")).unwrap().len(), 2);
    assert_eq!(other.permissions().path_string(other.resolve(P, &r("delete")).unwrap()).unwrap(), "/posts/delete");
    assert_eq!(other.snapshot().unwrap().roles, rbac.snapshot().unwrap().roles);
    // Counters survive as well.
    assert_eq!(other.insert(R, "next", "", None).unwrap(), rbac.insert(R, "next", "", None).unwrap());
}

#[test]
fn corrupted_snapshot_is_storage_failure_and_keeps_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rbac.snapshot");
    seeded().save_snapshot(&path).unwrap();
    let mut bytes = std::fs::read(&path).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0x5a;
    std::fs::write(&path, bytes).unwrap();

    let rbac = Rbac::default();
    rbac.insert(R, "keep", "", None).unwrap();
    let err = rbac.load_snapshot(&path).unwrap_err();
    assert!(err.is_storage());
    assert!(rbac.resolve(R, &r("keep")).is_ok());
}

#[test]
fn open_loads_existing_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    {
        let rbac = Rbac::with_root(RbacConfig::default(), dir.path()).unwrap();
        rbac.insert_path(R, "/a/b", &[]).unwrap();
        assert!(!rbac.snapshot_path().unwrap().exists());
        let saved = rbac.save().unwrap();
        assert!(saved.exists());
    }
    let rbac = Rbac::with_root(RbacConfig::default(), dir.path()).unwrap();
    assert_eq!(rbac.roles().count().unwrap(), 3);
}

#[test]
fn autosave_persists_every_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = RbacConfig { autosave: true, ..RbacConfig::default() };
    let rbac = Rbac::with_root(cfg.clone(), dir.path()).unwrap();
    rbac.insert(R, "admin", "", None).unwrap();
    rbac.insert(P, "read", "", None).unwrap();
    rbac.assign(&r("admin"), &r("read")).unwrap();
    drop(rbac);
    let reopened = Rbac::with_root(cfg, dir.path()).unwrap();
    assert_eq!(reopened.role_permissions(&r("admin")).unwrap(), vec![reopened.resolve(P, &r("read")).unwrap()]);
}

#[test]
fn failed_autosave_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = RbacConfig { autosave: true, snapshot_file: "missing/rbac.snapshot".into(), ..RbacConfig::default() };
    let rbac = Rbac::with_root(cfg, dir.path()).unwrap();
    let err = rbac.insert(R, "admin", "", None).unwrap_err();
    assert!(err.is_storage());
    assert_eq!(rbac.roles().count().unwrap(), 1);
    assert!(rbac.resolve(R, &r("admin")).unwrap_err().is_not_found());
    rbac.roles().validate().unwrap();
}

#[test]
fn in_memory_store_has_no_snapshot_path() {
    let rbac = Rbac::default();
    assert_eq!(rbac.save().unwrap_err().code_str(), "no_root");
}
