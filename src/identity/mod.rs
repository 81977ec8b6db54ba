//! Subjects, assignment edges and authorization checks.
//! Keep the public surface thin and split implementation across sub-modules.

mod assignments;
mod authorizer;
mod principal;

pub use assignments::{AssignmentGraph, EdgeId, EdgeSet, SubjectEdge};
pub use authorizer::{Authorizer, Grant};
pub use principal::SubjectId;
