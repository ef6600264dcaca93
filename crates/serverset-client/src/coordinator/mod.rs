//! Coordination service capability
//!
//! The server set only needs a handful of tree-store operations: connect,
//! create, exists, list children (optionally leaving a watch), read, delete.
//! [`Connector`] and [`Session`] describe them so any ZooKeeper-compatible
//! client can back a [`ServerSet`](crate::ServerSet). [`memory::MemoryStore`]
//! is an in-process implementation.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::error::CoordinationError;

pub type CoordinationResult<T> = std::result::Result<T, CoordinationError>;

/// Session state changes delivered alongside a new session.
pub type SessionEvents = mpsc::UnboundedReceiver<SessionEvent>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    Disconnected,
    Expired,
    Closed,
}

/// How a node is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateMode {
    Persistent,
    PersistentSequential,
    Ephemeral,
    EphemeralSequential,
}

impl CreateMode {
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, CreateMode::Ephemeral | CreateMode::EphemeralSequential)
    }

    pub fn is_sequential(&self) -> bool {
        matches!(
            self,
            CreateMode::PersistentSequential | CreateMode::EphemeralSequential
        )
    }
}

// ACL permission bits, as defined by ZooKeeper
pub const PERM_READ: u32 = 1;
pub const PERM_WRITE: u32 = 1 << 1;
pub const PERM_CREATE: u32 = 1 << 2;
pub const PERM_DELETE: u32 = 1 << 3;
pub const PERM_ADMIN: u32 = 1 << 4;
pub const PERM_ALL: u32 = PERM_READ | PERM_WRITE | PERM_CREATE | PERM_DELETE | PERM_ADMIN;

/// One access control entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Acl {
    pub perms: u32,
    pub scheme: String,
    pub id: String,
}

impl Acl {
    /// `world:anyone` with every permission.
    pub fn open_unsafe() -> Vec<Acl> {
        vec![Acl {
            perms: PERM_ALL,
            scheme: "world".to_string(),
            id: "anyone".to_string(),
        }]
    }
}

/// Node metadata returned by `exists` and `get_data`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stat {
    pub version: i32,
    /// Owning session for ephemeral nodes, 0 otherwise
    pub ephemeral_owner: i64,
    pub data_length: i32,
    pub num_children: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeEventKind {
    ChildrenChanged,
    NodeDeleted,
}

/// A fired watch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeEvent {
    pub path: String,
    pub kind: NodeEventKind,
}

/// One-shot watch left by [`Session::children_watch`].
#[derive(Debug)]
pub struct ChildWatch {
    rx: oneshot::Receiver<NodeEvent>,
}

impl ChildWatch {
    pub fn new(rx: oneshot::Receiver<NodeEvent>) -> Self {
        Self { rx }
    }

    /// Wait for the watch to fire. Fails with `SessionExpired` if the session
    /// ends first.
    pub async fn changed(self) -> CoordinationResult<NodeEvent> {
        self.rx.await.map_err(|_| CoordinationError::SessionExpired)
    }
}

/// An open session with the coordination service.
#[async_trait]
pub trait Session: Send + Sync + 'static {
    /// Create a node and return its actual path, which carries the sequence
    /// suffix for sequential modes.
    async fn create(
        &self,
        path: &str,
        data: &[u8],
        mode: CreateMode,
        acl: &[Acl],
    ) -> CoordinationResult<String>;

    /// `None` when the node does not exist.
    async fn exists(&self, path: &str) -> CoordinationResult<Option<Stat>>;

    async fn children(&self, path: &str) -> CoordinationResult<Vec<String>>;

    /// List children and leave a watch that fires on the next child change.
    async fn children_watch(&self, path: &str) -> CoordinationResult<(Vec<String>, ChildWatch)>;

    async fn get_data(&self, path: &str) -> CoordinationResult<(Vec<u8>, Stat)>;

    async fn delete(&self, path: &str) -> CoordinationResult<()>;

    /// End the session, removing its ephemeral nodes.
    async fn close(&self) -> CoordinationResult<()>;
}

/// Opens sessions against a coordination service ensemble.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Session: Session;

    async fn connect(
        &self,
        servers: &[String],
        timeout: Duration,
    ) -> CoordinationResult<(Self::Session, SessionEvents)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_mode_flags() {
        assert!(CreateMode::EphemeralSequential.is_ephemeral());
        assert!(CreateMode::EphemeralSequential.is_sequential());
        assert!(CreateMode::Ephemeral.is_ephemeral());
        assert!(!CreateMode::Persistent.is_ephemeral());
        assert!(!CreateMode::Persistent.is_sequential());
        assert!(CreateMode::PersistentSequential.is_sequential());
    }

    #[test]
    fn test_open_acl() {
        let acl = Acl::open_unsafe();
        assert_eq!(acl.len(), 1);
        assert_eq!(acl[0].perms, 31);
        assert_eq!(acl[0].scheme, "world");
        assert_eq!(acl[0].id, "anyone");
    }

    #[tokio::test]
    async fn test_child_watch_fires() {
        let (tx, rx) = oneshot::channel();
        let watch = ChildWatch::new(rx);
        tx.send(NodeEvent {
            path: "/a".to_string(),
            kind: NodeEventKind::ChildrenChanged,
        })
        .unwrap();

        let event = watch.changed().await.unwrap();
        assert_eq!(event.path, "/a");
        assert_eq!(event.kind, NodeEventKind::ChildrenChanged);
    }

    #[tokio::test]
    async fn test_child_watch_dropped_sender() {
        let (tx, rx) = oneshot::channel::<NodeEvent>();
        drop(tx);
        let err = ChildWatch::new(rx).changed().await.unwrap_err();
        assert_eq!(err, CoordinationError::SessionExpired);
    }
}
