//! Handles to created remote resources.

use super::ResourceKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a remote resource created by a stage.
///
/// Later stages use the id as a routing key (query parameter or body
/// field); the kind is kept for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceHandle {
    /// The id returned by the creation call.
    pub id: String,
    /// What kind of resource the id refers to.
    pub kind: ResourceKind,
}

impl ResourceHandle {
    /// Creates a new resource handle.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
