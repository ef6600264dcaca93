//! Joining a server set
//!
//! A member is an ephemeral sequential node `<directory>/member_NNNNNNNNNN`
//! carrying the member's [`Entity`] as JSON. It lives as long as the session
//! that created it, so each registration opens its own session.

use serverset_api::{Entity, join_path};
use tracing::{info, warn};

use crate::coordinator::{Acl, Connector, CreateMode, Session, SessionEvents};
use crate::error::{CoordinationError, Result, ServerSetError};
use crate::serverset::ServerSet;

/// A registered member of a server set.
///
/// Dropping a `Member` does not remove the node; it disappears when the
/// session ends. Call [`leave`](Self::leave) to deregister immediately.
pub struct Member<S: Session> {
    session: S,
    events: SessionEvents,
    node_path: String,
    entity: Entity,
}

impl<S: Session> Member<S> {
    /// Full path of the member node, including the sequence suffix.
    pub fn node_path(&self) -> &str {
        &self.node_path
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// Session state changes, e.g. expiry, after which the member is gone.
    pub fn session_events(&mut self) -> &mut SessionEvents {
        &mut self.events
    }

    /// Remove the member node and close the session.
    pub async fn leave(self) -> Result<()> {
        match self.session.delete(&self.node_path).await {
            Ok(()) | Err(CoordinationError::NoNode) => {}
            // The node went with the session
            Err(CoordinationError::SessionExpired) => {
                info!(path = %self.node_path, "Member session already ended");
                return Ok(());
            }
            Err(e) => {
                if let Err(close_err) = self.session.close().await {
                    warn!(error = %close_err, "Failed to close member session");
                }
                return Err(ServerSetError::at(&self.node_path, e));
            }
        }

        match self.session.close().await {
            Ok(()) | Err(CoordinationError::SessionExpired) => {}
            Err(e) => return Err(ServerSetError::at(&self.node_path, e)),
        }

        info!(path = %self.node_path, "Member left server set");
        Ok(())
    }
}

impl<C: Connector> ServerSet<C> {
    /// Register `host:port` as an ALIVE member.
    pub async fn register_endpoint(
        &self,
        host: impl Into<String>,
        port: i32,
    ) -> Result<Member<C::Session>> {
        self.register_entity(Entity::new(host, port)).await
    }

    /// Register a member with a fully specified record.
    ///
    /// Opens a session, creates the directory chain and then the member node.
    /// On failure the session is closed again.
    pub async fn register_entity(&self, entity: Entity) -> Result<Member<C::Session>> {
        let payload = entity.to_json()?;
        let (session, events) = self.connect().await?;

        let prefix_path = join_path(self.directory_path(), self.member_prefix());
        let created = match self.ensure_hierarchy(&session).await {
            Ok(()) => session
                .create(
                    &prefix_path,
                    &payload,
                    CreateMode::EphemeralSequential,
                    &Acl::open_unsafe(),
                )
                .await
                .map_err(|e| ServerSetError::at(&prefix_path, e)),
            Err(e) => Err(e),
        };

        let node_path = match created {
            Ok(node_path) => node_path,
            Err(e) => {
                if let Err(close_err) = session.close().await {
                    warn!(error = %close_err, "Failed to close session after failed registration");
                }
                return Err(e);
            }
        };

        info!(
            path = %node_path,
            endpoint = %entity.service_endpoint,
            "Member joined server set"
        );

        Ok(Member {
            session,
            events,
            node_path,
            entity,
        })
    }
}
