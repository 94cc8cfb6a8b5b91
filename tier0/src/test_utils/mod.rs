//! Test doubles for the collaborator protocols.
//!
//! Enabled with the `test-utils` feature. These are trivial in-memory
//! maps — enough to exercise every source modality and cache path
//! without real backends.

mod in_memory_store;

pub use in_memory_store::{InMemoryKvStore, InMemoryObjectStore};
