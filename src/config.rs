//! Store configuration.
//!
//! Settings are read from `<root>/rbac.json` when present and then overlaid with
//! `RBAC_*` environment variables. A missing file means defaults; a malformed file or an
//! unparsable variable is a storage failure rather than a silent fallback.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RbacError, Result};

pub const CONFIG_FILE: &str = "rbac.json";

/// Whether holding a role also grants the assignments of the roles beneath it.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoleInheritance {
    /// Only directly assigned roles count.
    #[default]
    None,
    /// A role also carries every descendant role's permission edges.
    Descendants,
}

impl RoleInheritance {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Some(RoleInheritance::None),
            "descendants" | "inherit" => Some(RoleInheritance::Descendants),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RbacConfig {
    /// Upper bound on any lock wait. Elapsed waits surface as `RbacError::Busy`.
    #[serde(default = "RbacConfig::default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default)]
    pub role_inheritance: RoleInheritance,
    /// Persist the snapshot after every successful mutation made through `Rbac`.
    #[serde(default)]
    pub autosave: bool,
    /// Snapshot file name, relative to the store root.
    #[serde(default = "RbacConfig::default_snapshot_file")]
    pub snapshot_file: String,
}

impl RbacConfig {
    fn default_lock_timeout_ms() -> u64 { 5_000 }
    fn default_snapshot_file() -> String { "rbac.snapshot".to_string() }

    pub fn lock_timeout(&self) -> Duration { Duration::from_millis(self.lock_timeout_ms) }

    pub fn snapshot_path(&self, root: &Path) -> PathBuf { root.join(&self.snapshot_file) }

    /// Load `<root>/rbac.json` (defaults if absent) and apply environment overrides.
    pub fn load(root: &Path) -> Result<Self> {
        let mut cfg = Self::load_file(&root.join(CONFIG_FILE))?;
        cfg.apply_env(|name| std::env::var(name).ok())?;
        debug!(target: "rbacstore::config", "loaded config root='{}' {:?}", root.display(), cfg);
        Ok(cfg)
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() { return Ok(Self::default()); }
        let bytes = std::fs::read(path)?;
        serde_json::from_slice::<Self>(&bytes)
            .map_err(|e| RbacError::storage("config_parse", format!("{}: {}", path.display(), e)))
    }

    pub fn save_file(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Overlay `RBAC_LOCK_TIMEOUT_MS`, `RBAC_ROLE_INHERITANCE` and `RBAC_AUTOSAVE`.
    /// The lookup is injected so tests don't have to mutate the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("RBAC_LOCK_TIMEOUT_MS") {
            self.lock_timeout_ms = v.trim().parse::<u64>()
                .map_err(|_| RbacError::storage("config_env", format!("RBAC_LOCK_TIMEOUT_MS='{}' is not a number", v)))?;
        }
        if let Some(v) = lookup("RBAC_ROLE_INHERITANCE") {
            self.role_inheritance = RoleInheritance::parse(&v)
                .ok_or_else(|| RbacError::storage("config_env", format!("RBAC_ROLE_INHERITANCE='{}' must be none|descendants", v)))?;
        }
        if let Some(v) = lookup("RBAC_AUTOSAVE") {
            self.autosave = parse_bool(&v)
                .ok_or_else(|| RbacError::storage("config_env", format!("RBAC_AUTOSAVE='{}' is not a boolean", v)))?;
        }
        Ok(())
    }
}

impl Default for RbacConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: Self::default_lock_timeout_ms(),
            role_inheritance: RoleInheritance::None,
            autosave: false,
            snapshot_file: Self::default_snapshot_file(),
        }
    }
}

pub fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = RbacConfig::load_file(&tmp.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(cfg, RbacConfig::default());
        assert_eq!(cfg.lock_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join(CONFIG_FILE);
        std::fs::write(&p, r#"{"role_inheritance":"descendants"}"#).unwrap();
        let cfg = RbacConfig::load_file(&p).unwrap();
        assert_eq!(cfg.role_inheritance, RoleInheritance::Descendants);
        assert_eq!(cfg.lock_timeout_ms, 5_000);
        assert_eq!(cfg.snapshot_file, "rbac.snapshot");
    }

    #[test]
    fn malformed_file_is_storage_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join(CONFIG_FILE);
        std::fs::write(&p, "{not json").unwrap();
        let err = RbacConfig::load_file(&p).unwrap_err();
        assert!(err.is_storage());
        assert_eq!(err.code_str(), "config_parse");
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("RBAC_LOCK_TIMEOUT_MS", "250"),
            ("RBAC_ROLE_INHERITANCE", "Descendants"),
            ("RBAC_AUTOSAVE", "on"),
        ].into_iter().collect();
        let mut cfg = RbacConfig::default();
        cfg.apply_env(|k| env.get(k).map(|s| s.to_string())).unwrap();
        assert_eq!(cfg.lock_timeout_ms, 250);
        assert_eq!(cfg.role_inheritance, RoleInheritance::Descendants);
        assert!(cfg.autosave);
    }

    #[test]
    fn bad_env_value_is_storage_failure() {
        for (key, bad) in [("RBAC_AUTOSAVE", "maybe"), ("RBAC_LOCK_TIMEOUT_MS", "soon"), ("RBAC_ROLE_INHERITANCE", "ancestors")] {
            let mut cfg = RbacConfig::default();
            let err = cfg.apply_env(|k| (k == key).then(|| bad.to_string())).unwrap_err();
            assert!(err.is_storage(), "{}: {:?}", key, err);
            assert_eq!(err.code_str(), "config_env");
            assert_eq!(cfg, RbacConfig::default());
        }
    }

    #[test]
    fn save_then_load_file() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join(CONFIG_FILE);
        let cfg = RbacConfig { autosave: true, lock_timeout_ms: 10, ..Default::default() };
        cfg.save_file(&p).unwrap();
        assert_eq!(RbacConfig::load_file(&p).unwrap(), cfg);
    }
}
