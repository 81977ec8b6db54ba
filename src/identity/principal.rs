use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of an already-authenticated subject (user, service, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new<S: Into<String>>(s: S) -> Self { SubjectId(s.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl From<&str> for SubjectId {
    fn from(s: &str) -> Self { SubjectId(s.to_string()) }
}

impl From<String> for SubjectId {
    fn from(s: String) -> Self { SubjectId(s) }
}

impl From<u64> for SubjectId {
    fn from(v: u64) -> Self { SubjectId(v.to_string()) }
}

impl From<&SubjectId> for SubjectId {
    fn from(s: &SubjectId) -> Self { s.clone() }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}
