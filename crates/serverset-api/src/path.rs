//! Namespace path conventions
//!
//! Members of a service register under a single directory derived from the
//! role, environment and service name. The default layout is
//! `<base>/<role>/<environment>/<service>` with `/aurora` as the base, which
//! is what Aurora and Finagle clients expect. Deployments with a different
//! tree can plug in their own [`PathFormat`].

use crate::error::{ApiError, Result};
use crate::model::DEFAULT_BASE_DIRECTORY;

pub const PATH_SEPARATOR: char = '/';

/// Strategy that maps a role/environment/service triple to the directory
/// holding the service's member nodes.
pub trait PathFormat: Send + Sync {
    fn format(&self, role: &str, environment: &str, service: &str) -> String;
}

impl<F> PathFormat for F
where
    F: Fn(&str, &str, &str) -> String + Send + Sync,
{
    fn format(&self, role: &str, environment: &str, service: &str) -> String {
        self(role, environment, service)
    }
}

/// Default layout: `<base>/<role>/<environment>/<service>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BaseDirectoryLayout {
    base: String,
}

impl BaseDirectoryLayout {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        let trimmed = base.trim_end_matches(PATH_SEPARATOR);
        Self {
            base: trimmed.to_string(),
        }
    }

    pub fn base(&self) -> &str {
        if self.base.is_empty() {
            "/"
        } else {
            &self.base
        }
    }
}

impl Default for BaseDirectoryLayout {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DIRECTORY)
    }
}

impl PathFormat for BaseDirectoryLayout {
    fn format(&self, role: &str, environment: &str, service: &str) -> String {
        format!("{}/{}/{}/{}", self.base, role, environment, service)
    }
}

/// Reject service names that would add levels to the hierarchy.
pub fn validate_service_name(service: &str) -> Result<()> {
    if service.contains(PATH_SEPARATOR) {
        return Err(ApiError::InvalidServiceName(service.to_string()));
    }
    Ok(())
}

/// Build the directory path for a service using `layout`.
pub fn derive_namespace_path(
    layout: &dyn PathFormat,
    role: &str,
    environment: &str,
    service: &str,
) -> Result<String> {
    validate_service_name(service)?;
    Ok(layout.format(role, environment, service))
}

/// Join a node name onto a directory path.
pub fn join_path(parent: &str, child: &str) -> String {
    let parent = parent.trim_end_matches(PATH_SEPARATOR);
    format!("{parent}{PATH_SEPARATOR}{child}")
}

/// Lexically normalize a path: collapse repeated separators, drop `.`,
/// resolve `..` and strip any trailing separator. The result is always rooted.
pub fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split(PATH_SEPARATOR) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut cleaned = String::with_capacity(path.len() + 1);
    for segment in &segments {
        cleaned.push(PATH_SEPARATOR);
        cleaned.push_str(segment);
    }
    if cleaned.is_empty() {
        cleaned.push(PATH_SEPARATOR);
    }
    cleaned
}

/// Every directory that must exist for `path` to exist, root first.
///
/// `/a/b/c` expands to `/a`, `/a/b`, `/a/b/c`. The root itself is never part of
/// the chain, so `/` expands to nothing.
pub fn ancestor_paths(path: &str) -> Vec<String> {
    let cleaned = clean_path(path);

    let mut chain = Vec::new();
    let mut current = String::with_capacity(cleaned.len());
    for segment in cleaned.split(PATH_SEPARATOR).filter(|s| !s.is_empty()) {
        current.push(PATH_SEPARATOR);
        current.push_str(segment);
        chain.push(current.clone());
    }
    chain
}
