//! Server set configuration
//!
//! Defaults match the Aurora/Finagle conventions: members live under
//! `/aurora/<role>/<environment>/<service>` as `member_` sequential nodes, and
//! connections give up after 5 seconds. Values can be layered from a config
//! file and `SERVERSET_*` environment variables with [`ServerSetConfig::load`].

use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use config::{Config, Environment, Map};
use serde::Deserialize;
use serverset_api::{
    BaseDirectoryLayout, DEFAULT_BASE_DIRECTORY, DEFAULT_MEMBER_PREFIX, PathFormat,
};

use crate::error::{Result, ServerSetError};

/// Default coordination service connection timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Environment variable prefix for [`ServerSetConfig::load`].
pub const ENV_PREFIX: &str = "SERVERSET";

/// Configuration shared by the server sets of a process.
#[derive(Clone)]
pub struct ServerSetConfig {
    /// Root of the namespace; must begin with `/`
    pub base_directory: String,
    /// Name prefix of the sequential member nodes
    pub member_prefix: String,
    /// Connection timeout applied to new server sets
    pub timeout: Duration,
    layout: Option<Arc<dyn PathFormat>>,
}

impl Default for ServerSetConfig {
    fn default() -> Self {
        Self {
            base_directory: DEFAULT_BASE_DIRECTORY.to_string(),
            member_prefix: DEFAULT_MEMBER_PREFIX.to_string(),
            timeout: DEFAULT_TIMEOUT,
            layout: None,
        }
    }
}

impl Debug for ServerSetConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSetConfig")
            .field("base_directory", &self.base_directory)
            .field("member_prefix", &self.member_prefix)
            .field("timeout", &self.timeout)
            .field("custom_layout", &self.layout.is_some())
            .finish()
    }
}

impl ServerSetConfig {
    pub fn with_base_directory(mut self, base_directory: impl Into<String>) -> Self {
        self.base_directory = base_directory.into();
        self
    }

    pub fn with_member_prefix(mut self, member_prefix: impl Into<String>) -> Self {
        self.member_prefix = member_prefix.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the `<base>/<role>/<environment>/<service>` layout.
    ///
    /// A custom layout ignores `base_directory`.
    pub fn with_layout<L>(mut self, layout: L) -> Self
    where
        L: PathFormat + 'static,
    {
        self.layout = Some(Arc::new(layout));
        self
    }

    /// The path layout in effect.
    pub fn layout(&self) -> Arc<dyn PathFormat> {
        match &self.layout {
            Some(layout) => layout.clone(),
            None => Arc::new(BaseDirectoryLayout::new(self.base_directory.clone())),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.base_directory.starts_with('/') {
            return Err(ServerSetError::Config(format!(
                "base directory ({}) must begin with '/'",
                self.base_directory
            )));
        }
        if self.member_prefix.is_empty() || self.member_prefix.contains('/') {
            return Err(ServerSetError::Config(format!(
                "member prefix ({}) must be a non-empty node name",
                self.member_prefix
            )));
        }
        Ok(())
    }

    /// Load configuration from an optional file plus `SERVERSET_*` environment
    /// variables. Environment values win over the file.
    pub fn load(file: Option<&str>) -> Result<Self> {
        Self::load_with_env(file, None)
    }

    /// Like [`load`](Self::load), reading `SERVERSET_*` variables from `env`
    /// instead of the process environment when given.
    pub fn load_with_env(file: Option<&str>, env: Option<Map<String, String>>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(config::File::with_name(file));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .source(env),
        );

        let settings: ServerSetSettings = builder.build()?.try_deserialize()?;
        let config = Self::from(settings);
        config.validate()?;
        Ok(config)
    }
}

/// Serializable form of [`ServerSetConfig`].
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerSetSettings {
    pub base_directory: String,
    pub member_prefix: String,
    pub timeout_ms: u64,
}

impl Default for ServerSetSettings {
    fn default() -> Self {
        Self {
            base_directory: DEFAULT_BASE_DIRECTORY.to_string(),
            member_prefix: DEFAULT_MEMBER_PREFIX.to_string(),
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
        }
    }
}

impl From<ServerSetSettings> for ServerSetConfig {
    fn from(settings: ServerSetSettings) -> Self {
        ServerSetConfig::default()
            .with_base_directory(settings.base_directory)
            .with_member_prefix(settings.member_prefix)
            .with_timeout(Duration::from_millis(settings.timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = ServerSetConfig::default();
        assert_eq!(config.base_directory, "/aurora");
        assert_eq!(config.member_prefix, "member_");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(config.validate().is_ok());
        assert_eq!(
            config.layout().format("www", "prod", "frontend"),
            "/aurora/www/prod/frontend"
        );
    }

    #[test]
    fn test_config_builder() {
        let config = ServerSetConfig::default()
            .with_base_directory("/discovery")
            .with_member_prefix("node_")
            .with_timeout(Duration::from_millis(1500));

        assert_eq!(config.member_prefix, "node_");
        assert_eq!(config.timeout, Duration::from_millis(1500));
        assert_eq!(config.layout().format("r", "e", "s"), "/discovery/r/e/s");
    }

    #[test]
    fn test_custom_layout_overrides_base() {
        let config = ServerSetConfig::default()
            .with_base_directory("/ignored")
            .with_layout(|role: &str, environment: &str, service: &str| {
                format!("/{environment}/{service}/{role}")
            });

        assert_eq!(config.layout().format("r", "e", "s"), "/e/s/r");
        assert!(format!("{config:?}").contains("custom_layout: true"));
    }

    #[test]
    fn test_validate_rejects_relative_base() {
        let config = ServerSetConfig::default().with_base_directory("aurora");
        assert!(matches!(config.validate(), Err(ServerSetError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_member_prefix() {
        let config = ServerSetConfig::default().with_member_prefix("");
        assert!(matches!(config.validate(), Err(ServerSetError::Config(_))));

        let config = ServerSetConfig::default().with_member_prefix("a/b");
        assert!(matches!(config.validate(), Err(ServerSetError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("serverset.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "base_directory = \"/discovery\"").unwrap();
        writeln!(file, "timeout_ms = 2500").unwrap();

        let config = ServerSetConfig::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.base_directory, "/discovery");
        assert_eq!(config.member_prefix, "member_");
        assert_eq!(config.timeout, Duration::from_millis(2500));
    }

    #[test]
    fn test_load_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("serverset.toml");
        std::fs::write(
            &path,
            "base_directory = \"/discovery\"\nmember_prefix = \"file_\"\ntimeout_ms = 2500\n",
        )
        .unwrap();

        let env: Map<String, String> = [
            ("SERVERSET_MEMBER_PREFIX", "node_"),
            ("SERVERSET_TIMEOUT_MS", "750"),
            ("OTHER_TIMEOUT_MS", "1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config =
            ServerSetConfig::load_with_env(Some(path.to_str().unwrap()), Some(env)).unwrap();
        assert_eq!(config.base_directory, "/discovery");
        assert_eq!(config.member_prefix, "node_");
        assert_eq!(config.timeout, Duration::from_millis(750));
    }

    #[test]
    fn test_load_env_without_file() {
        let env: Map<String, String> = [("SERVERSET_BASE_DIRECTORY", "/env")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let config = ServerSetConfig::load_with_env(None, Some(env)).unwrap();
        assert_eq!(config.base_directory, "/env");
        assert_eq!(config.member_prefix, "member_");
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_load_rejects_invalid_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("serverset.toml");
        std::fs::write(&path, "base_directory = \"relative\"\n").unwrap();

        let err = ServerSetConfig::load(Some(path.to_str().unwrap())).unwrap_err();
        assert!(matches!(err, ServerSetError::Config(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ServerSetConfig::load(Some("/nonexistent/serverset.toml")).unwrap_err();
        assert!(matches!(err, ServerSetError::Settings(_)));
    }
}
