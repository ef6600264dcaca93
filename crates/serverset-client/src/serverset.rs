//! Server set façade
//!
//! A `ServerSet` names one service in the namespace and knows how to reach the
//! coordination service. It derives the service's directory once, creates the
//! directory chain on demand and checks that it exists. Member registration
//! and watching build on these in [`member`](crate::member) and
//! [`watch`](crate::watch).

use std::time::Duration;

use serverset_api::{ancestor_paths, clean_path, derive_namespace_path};
use tracing::{debug, info};

use crate::config::ServerSetConfig;
use crate::coordinator::{Acl, Connector, CreateMode, Session, SessionEvents};
use crate::error::{CoordinationError, Result, ServerSetError};

/// A service whose live servers are kept as ephemeral member nodes.
pub struct ServerSet<C: Connector> {
    role: String,
    environment: String,
    service: String,
    servers: Vec<String>,
    directory_path: String,
    member_prefix: String,
    timeout: Duration,
    connector: C,
}

impl<C: Connector> ServerSet<C> {
    /// Create a server set with the default configuration.
    ///
    /// Fails with `InvalidServiceName` if `service` contains a slash. No
    /// connection is made here.
    pub fn new(
        role: impl Into<String>,
        environment: impl Into<String>,
        service: impl Into<String>,
        servers: Vec<String>,
        connector: C,
    ) -> Result<Self> {
        Self::with_config(
            role,
            environment,
            service,
            servers,
            &ServerSetConfig::default(),
            connector,
        )
    }

    pub fn with_config(
        role: impl Into<String>,
        environment: impl Into<String>,
        service: impl Into<String>,
        servers: Vec<String>,
        config: &ServerSetConfig,
        connector: C,
    ) -> Result<Self> {
        config.validate()?;

        let role = role.into();
        let environment = environment.into();
        let service = service.into();
        let layout = config.layout();
        let formatted = derive_namespace_path(layout.as_ref(), &role, &environment, &service)?;
        // Layouts may leave doubled or trailing separators
        let directory_path = clean_path(&formatted);

        Ok(Self {
            role,
            environment,
            service,
            servers,
            directory_path,
            member_prefix: config.member_prefix.clone(),
            timeout: config.timeout,
            connector,
        })
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// The coordination servers this set connects to.
    pub fn zookeeper_servers(&self) -> &[String] {
        &self.servers
    }

    /// Directory holding the member nodes.
    pub fn directory_path(&self) -> &str {
        &self.directory_path
    }

    /// Directories created by [`ensure_hierarchy`](Self::ensure_hierarchy), root first.
    pub fn ancestor_paths(&self) -> Vec<String> {
        ancestor_paths(&self.directory_path)
    }

    pub fn member_prefix(&self) -> &str {
        &self.member_prefix
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Open a session. Failures are returned as-is; there is no retry.
    pub async fn connect(&self) -> Result<(C::Session, SessionEvents)> {
        let (session, events) = self
            .connector
            .connect(&self.servers, self.timeout)
            .await
            .map_err(ServerSetError::Connection)?;

        info!(
            servers = %self.servers.join(","),
            path = %self.directory_path,
            "Connected to coordination service"
        );
        Ok((session, events))
    }

    /// Create every directory on the path to the member directory.
    ///
    /// Existing nodes are fine, so concurrent callers never fail each other.
    /// Any other error stops the walk; directories already created stay.
    pub async fn ensure_hierarchy(&self, session: &C::Session) -> Result<()> {
        let acl = Acl::open_unsafe();
        for path in self.ancestor_paths() {
            match session
                .create(&path, &[], CreateMode::Persistent, &acl)
                .await
            {
                Ok(_) => debug!(path = %path, "Created directory node"),
                Err(CoordinationError::NodeExists) => {}
                Err(e) => return Err(ServerSetError::at(&path, e)),
            }
        }
        Ok(())
    }

    /// Check, without creating anything, that every directory on the path
    /// exists. A missing directory is reported as `NotFound`.
    pub async fn verify_hierarchy(&self, session: &C::Session) -> Result<()> {
        for path in self.ancestor_paths() {
            match session.exists(&path).await {
                Ok(Some(_)) => {}
                Ok(None) => return Err(ServerSetError::NotFound(path)),
                Err(e) => return Err(ServerSetError::at(&path, e)),
            }
        }
        Ok(())
    }
}
