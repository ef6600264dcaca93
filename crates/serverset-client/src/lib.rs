//! Serverset Client - service registration over a ZooKeeper-style tree store
//!
//! This crate provides:
//! - `ServerSet`: namespace path derivation, idempotent directory creation and
//!   read-only verification for one role/environment/service
//! - Member registration as ephemeral sequential nodes carrying the Finagle
//!   server set record
//! - A watch that tracks the ALIVE endpoints of a server set
//! - The coordination service capability traits and an in-memory store

pub mod config;
pub mod coordinator;
pub mod error;
pub mod member;
pub mod serverset;
pub mod watch;

pub use config::{DEFAULT_TIMEOUT, ServerSetConfig, ServerSetSettings};
pub use coordinator::memory::{MemorySession, MemoryStore};
pub use coordinator::{
    Acl, ChildWatch, Connector, CreateMode, NodeEvent, NodeEventKind, Session, SessionEvent,
    SessionEvents, Stat,
};
pub use error::{CoordinationError, Result, ServerSetError};
pub use member::Member;
pub use serverset::ServerSet;
pub use watch::Watch;

// Wire model re-exports
pub use serverset_api::{Endpoint, Entity, PathFormat, Status};
