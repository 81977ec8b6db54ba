//! On-disk image of the whole authority store.
//!
//! Layout: `b"RBS1"` magic, a bincode-encoded [`Snapshot`], then the CRC32 (little
//! endian) of the bincode payload. Files are written to a sibling `.tmp` and renamed over
//! the target so a crash never leaves a half-written snapshot behind.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crc32fast::Hasher as Crc32;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::nested_set::{NestedSet, Node, NodeId};
use crate::error::{RbacError, Result};

pub const SNAPSHOT_VERSION: u32 = 1;
const MAGIC: &[u8; 4] = b"RBS1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEdgeRow {
    pub id: u64,
    pub role_id: NodeId,
    pub permission_id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectEdgeRow {
    pub id: u64,
    pub role_id: NodeId,
    pub subject_id: String,
    pub constraint: Option<String>,
}

/// Rows of one partition plus its id counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionImage {
    pub rows: Vec<Node>,
    pub next_id: u64,
}

impl PartitionImage {
    pub fn from_set(set: &NestedSet) -> Self { Self { rows: set.rows().to_vec(), next_id: set.next_id() } }

    /// Rebuild and validate the nested set.
    pub fn into_set(self) -> Result<NestedSet> { NestedSet::from_rows(self.rows, self.next_id) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub created_ms: i64,
    pub roles: PartitionImage,
    pub permissions: PartitionImage,
    pub role_permissions: Vec<PermissionEdgeRow>,
    pub next_permission_edge_id: u64,
    pub subject_roles: Vec<SubjectEdgeRow>,
    pub next_subject_edge_id: u64,
}

impl Snapshot {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self)?;
        let mut hasher = Crc32::new();
        hasher.update(&payload);
        let crc = hasher.finalize();
        let mut out = Vec::with_capacity(MAGIC.len() + payload.len() + 4);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&payload);
        out.extend_from_slice(&crc.to_le_bytes());
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Snapshot> {
        if bytes.len() < MAGIC.len() + 4 {
            return Err(RbacError::storage("snapshot_truncated", format!("snapshot is only {} bytes", bytes.len())));
        }
        if &bytes[..MAGIC.len()] != MAGIC {
            return Err(RbacError::storage("bad_magic", "not an rbacstore snapshot"));
        }
        let (payload, trailer) = bytes[MAGIC.len()..].split_at(bytes.len() - MAGIC.len() - 4);
        let mut crc_bytes = [0u8; 4];
        crc_bytes.copy_from_slice(trailer);
        let expected = u32::from_le_bytes(crc_bytes);
        let mut hasher = Crc32::new();
        hasher.update(payload);
        let got = hasher.finalize();
        if expected != got {
            return Err(RbacError::storage("checksum_mismatch", format!("snapshot crc {:08x} != stored {:08x}", got, expected)));
        }
        let snap: Snapshot = bincode::deserialize(payload)?;
        if snap.version != SNAPSHOT_VERSION {
            return Err(RbacError::storage("unsupported_version", format!("snapshot version {} (expected {})", snap.version, SNAPSHOT_VERSION)));
        }
        Ok(snap)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let bytes = self.encode()?;
        let tmp = tmp_path(path);
        let res = (|| -> Result<()> {
            let mut f = File::create(&tmp)?;
            f.write_all(&bytes)?;
            f.sync_all()?;
            std::fs::rename(&tmp, path)?;
            Ok(())
        })();
        if res.is_err() {
            let _ = std::fs::remove_file(&tmp);
        }
        res?;
        info!(target: "rbacstore::snapshot", "saved snapshot {} ({} bytes, {} roles, {} permissions)", path.display(), bytes.len(), self.roles.rows.len(), self.permissions.rows.len());
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Snapshot> {
        let bytes = std::fs::read(path)?;
        debug!(target: "rbacstore::snapshot", "read {} bytes from {}", bytes.len(), path.display());
        Self::decode(&bytes)
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

pub fn now_ms() -> i64 { chrono::Utc::now().timestamp_millis() }
