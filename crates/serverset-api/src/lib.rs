//! Serverset API - wire model and namespace conventions
//!
//! This crate provides:
//! - The Finagle-compatible member record (`Entity`) written into each member node
//! - Namespace path construction for a role/environment/service triple
//! - Ancestor chain expansion used to create the directory hierarchy
//!
//! Nothing in here performs I/O.

pub mod error;
pub mod model;
pub mod path;

pub use error::{ApiError, Result};
pub use model::*;
pub use path::{
    BaseDirectoryLayout, PathFormat, ancestor_paths, clean_path, derive_namespace_path,
    join_path, validate_service_name,
};
