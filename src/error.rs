//! Unified error model for the authority store.
//! Every fallible operation in the crate returns `RbacError`; each variant carries a
//! stable machine code and a human message so frontends (CLI, embedding services) can
//! map errors without string matching.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RbacError {
    #[error("{code}: {message}")]
    NotFound { code: String, message: String },
    #[error("{code}: {message}")]
    InvalidArgument { code: String, message: String },
    #[error("{code}: {message}")]
    Conflict { code: String, message: String },
    /// Underlying persistence or integrity failure; the source text is carried opaquely.
    #[error("{code}: {message}")]
    StorageFailure { code: String, message: String },
    /// A bounded lock wait elapsed before the partition became available.
    #[error("{code}: {message}")]
    Busy { code: String, message: String },
}

impl RbacError {
    pub fn code_str(&self) -> &str {
        match self {
            RbacError::NotFound { code, .. }
            | RbacError::InvalidArgument { code, .. }
            | RbacError::Conflict { code, .. }
            | RbacError::StorageFailure { code, .. }
            | RbacError::Busy { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            RbacError::NotFound { message, .. }
            | RbacError::InvalidArgument { message, .. }
            | RbacError::Conflict { message, .. }
            | RbacError::StorageFailure { message, .. }
            | RbacError::Busy { message, .. } => message.as_str(),
        }
    }

    pub fn not_found<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { RbacError::NotFound { code: code.into(), message: msg.into() } }
    pub fn invalid<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { RbacError::InvalidArgument { code: code.into(), message: msg.into() } }
    pub fn conflict<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { RbacError::Conflict { code: code.into(), message: msg.into() } }
    pub fn storage<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { RbacError::StorageFailure { code: code.into(), message: msg.into() } }
    pub fn busy<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { RbacError::Busy { code: code.into(), message: msg.into() } }

    /// Missing confirmation on a destructive call.
    pub fn confirm_required(op: &str) -> Self {
        RbacError::invalid("confirm_required", format!("{} requires an explicit confirmation flag", op))
    }

    pub fn is_not_found(&self) -> bool { matches!(self, RbacError::NotFound { .. }) }
    pub fn is_invalid(&self) -> bool { matches!(self, RbacError::InvalidArgument { .. }) }
    pub fn is_busy(&self) -> bool { matches!(self, RbacError::Busy { .. }) }
    pub fn is_storage(&self) -> bool { matches!(self, RbacError::StorageFailure { .. }) }

    /// Process exit code used by the CLI when a command fails.
    pub fn exit_code(&self) -> i32 {
        match self {
            RbacError::NotFound { .. } => 3,
            RbacError::InvalidArgument { .. } => 2,
            RbacError::Conflict { .. } => 4,
            RbacError::StorageFailure { .. } => 5,
            RbacError::Busy { .. } => 6,
        }
    }
}

pub type Result<T> = std::result::Result<T, RbacError>;

impl From<std::io::Error> for RbacError {
    fn from(err: std::io::Error) -> Self {
        RbacError::storage("io_error", err.to_string())
    }
}

impl From<bincode::Error> for RbacError {
    fn from(err: bincode::Error) -> Self {
        RbacError::storage("codec_error", err.to_string())
    }
}

impl From<serde_json::Error> for RbacError {
    fn from(err: serde_json::Error) -> Self {
        RbacError::storage("json_error", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_and_message() {
        let e = RbacError::not_found("title_not_found", "no node titled 'x'");
        assert_eq!(e.to_string(), "title_not_found: no node titled 'x'");
        assert_eq!(e.code_str(), "title_not_found");
        assert_eq!(e.message(), "no node titled 'x'");
    }

    #[test]
    fn exit_code_mapping() {
        assert_eq!(RbacError::invalid("bad", "x").exit_code(), 2);
        assert_eq!(RbacError::not_found("nf", "x").exit_code(), 3);
        assert_eq!(RbacError::conflict("dup", "x").exit_code(), 4);
        assert_eq!(RbacError::storage("io", "x").exit_code(), 5);
        assert_eq!(RbacError::busy("busy", "x").exit_code(), 6);
    }

    #[test]
    fn confirm_required_is_invalid_argument() {
        let e = RbacError::confirm_required("reset");
        assert!(e.is_invalid());
        assert_eq!(e.code_str(), "confirm_required");
    }

    #[test]
    fn io_errors_become_storage_failures() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let e: RbacError = io.into();
        assert!(e.is_storage());
        assert_eq!(e.code_str(), "io_error");
    }

    #[test]
    fn serializes_with_type_tag() {
        let v = serde_json::to_value(RbacError::busy("lock_timeout", "roles")).unwrap();
        assert_eq!(v["type"], "busy");
        assert_eq!(v["code"], "lock_timeout");
    }
}
