#![deny(missing_docs)]
//! Source loading and language compilation for the strata code tier.
//!
//! Three pieces:
//! - [`SourceLoader`]: resolve a source descriptor to text or a
//!   binary-modality sentinel.
//! - [`strip_types`]: the TypeScript-to-JavaScript stripping pipeline.
//! - [`Compiler`]: language-dispatched transformation with a
//!   content-addressed artifact cache in front.

pub mod compiler;
pub mod loader;
pub mod typescript;

pub use compiler::{CompileOutput, Compiler};
pub use loader::SourceLoader;
pub use typescript::strip_types;
