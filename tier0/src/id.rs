//! Typed ID wrappers for function, execution, and worker identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed ID wrappers prevent mixing up function IDs, execution IDs, etc.
/// These are just strings underneath — the protocol doesn't care what
/// caller-supplied IDs look like. Generated execution IDs are UUID-backed.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new typed ID from anything that converts to String.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

typed_id!(FunctionId, "Unique identifier for a function definition.");
typed_id!(ExecutionId, "Unique identifier for one execution of a function.");
typed_id!(WorkerId, "Identifier for a provisioned worker in a loader binding.");

impl ExecutionId {
    /// Generate a fresh execution ID.
    ///
    /// UUIDv4-backed: the same ID never appears twice in a process
    /// lifetime (and, for practical purposes, across processes).
    pub fn generate() -> Self {
        Self(format!("exec_{}", uuid::Uuid::new_v4()))
    }
}
