//! Shared types for deliver.
//!
//! Package names, versions and version ranges, requirements, and the
//! package/variant model that the resolver and installer operate on. Nothing in
//! this crate touches the filesystem; loading definitions is the job of
//! `deliver-core`.

pub mod package;
pub mod requirement;
pub mod types;
pub mod version;

// Re-exports
pub use package::*;
pub use requirement::*;
pub use types::*;
pub use version::*;
