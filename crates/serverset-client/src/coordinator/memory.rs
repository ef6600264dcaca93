//! In-process coordination service
//!
//! `MemoryStore` keeps a node tree behind a mutex and hands out
//! [`MemorySession`]s that behave like ZooKeeper sessions: creates need an
//! existing parent, duplicate creates fail with `NodeExists`, sequential nodes
//! get a 10-digit per-parent counter, ephemeral nodes vanish with their
//! session, and child watches fire once.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::{
    Acl, ChildWatch, Connector, CoordinationResult, CreateMode, NodeEvent, NodeEventKind,
    Session, SessionEvent, SessionEvents, Stat,
};
use crate::error::CoordinationError;

const ROOT: &str = "/";

struct Node {
    data: Vec<u8>,
    acl: Vec<Acl>,
    ephemeral_owner: i64,
    version: i32,
    child_sequence: u32,
}

impl Node {
    fn new(data: Vec<u8>, acl: Vec<Acl>, ephemeral_owner: i64) -> Self {
        Self {
            data,
            acl,
            ephemeral_owner,
            version: 0,
            child_sequence: 0,
        }
    }
}

struct Watcher {
    session_id: i64,
    tx: oneshot::Sender<NodeEvent>,
}

struct Tree {
    nodes: BTreeMap<String, Node>,
    sessions: HashMap<i64, mpsc::UnboundedSender<SessionEvent>>,
    child_watches: HashMap<String, Vec<Watcher>>,
    next_session_id: i64,
    available: bool,
}

impl Tree {
    fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(ROOT.to_string(), Node::new(Vec::new(), Acl::open_unsafe(), 0));
        Self {
            nodes,
            sessions: HashMap::new(),
            child_watches: HashMap::new(),
            next_session_id: 1,
            available: true,
        }
    }

    fn check_session(&self, session_id: i64) -> CoordinationResult<()> {
        if self.sessions.contains_key(&session_id) {
            Ok(())
        } else {
            Err(CoordinationError::SessionExpired)
        }
    }

    fn children_of(&self, path: &str) -> Vec<String> {
        let prefix = if path == ROOT {
            ROOT.to_string()
        } else {
            format!("{path}/")
        };
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, _)| {
                let name = &key[prefix.len()..];
                (!name.is_empty() && !name.contains('/')).then(|| name.to_string())
            })
            .collect()
    }

    fn stat(&self, path: &str, node: &Node) -> Stat {
        Stat {
            version: node.version,
            ephemeral_owner: node.ephemeral_owner,
            data_length: node.data.len() as i32,
            num_children: self.children_of(path).len() as i32,
        }
    }

    fn fire(&mut self, path: &str, kind: NodeEventKind) {
        if let Some(watchers) = self.child_watches.remove(path) {
            for watcher in watchers {
                let _ = watcher.tx.send(NodeEvent {
                    path: path.to_string(),
                    kind,
                });
            }
        }
    }

    fn create(
        &mut self,
        session_id: i64,
        path: &str,
        data: &[u8],
        mode: CreateMode,
        acl: &[Acl],
    ) -> CoordinationResult<String> {
        self.check_session(session_id)?;
        validate_path(path, mode.is_sequential())?;

        let parent_path = parent_of(path);
        let parent = self.nodes.get(parent_path).ok_or(CoordinationError::NoNode)?;
        if parent.ephemeral_owner != 0 {
            return Err(CoordinationError::NoChildrenForEphemerals);
        }

        let actual = if mode.is_sequential() {
            format!("{path}{:010}", parent.child_sequence)
        } else {
            path.to_string()
        };
        if self.nodes.contains_key(&actual) {
            return Err(CoordinationError::NodeExists);
        }

        if let Some(parent) = self.nodes.get_mut(parent_path) {
            parent.child_sequence += 1;
        }

        let owner = if mode.is_ephemeral() { session_id } else { 0 };
        self.nodes
            .insert(actual.clone(), Node::new(data.to_vec(), acl.to_vec(), owner));
        self.fire(parent_path, NodeEventKind::ChildrenChanged);
        Ok(actual)
    }

    fn delete(&mut self, path: &str) -> CoordinationResult<()> {
        validate_path(path, false)?;
        if path == ROOT {
            return Err(CoordinationError::BadPath(path.to_string()));
        }
        if !self.nodes.contains_key(path) {
            return Err(CoordinationError::NoNode);
        }
        if !self.children_of(path).is_empty() {
            return Err(CoordinationError::NotEmpty);
        }

        self.nodes.remove(path);
        self.fire(path, NodeEventKind::NodeDeleted);
        self.fire(parent_of(path), NodeEventKind::ChildrenChanged);
        Ok(())
    }

    fn end_session(&mut self, session_id: i64, event: SessionEvent) -> CoordinationResult<()> {
        let events = self
            .sessions
            .remove(&session_id)
            .ok_or(CoordinationError::SessionExpired)?;

        let owned: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.ephemeral_owner == session_id)
            .map(|(path, _)| path.clone())
            .collect();
        for path in owned {
            // Ephemeral nodes are always leaves
            let _ = self.delete(&path);
        }

        // Dropping the senders wakes the session's pending watches
        for watchers in self.child_watches.values_mut() {
            watchers.retain(|w| w.session_id != session_id);
        }
        self.child_watches.retain(|_, watchers| !watchers.is_empty());

        let _ = events.send(event);
        Ok(())
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => ROOT,
        Some(idx) => &path[..idx],
    }
}

fn validate_path(path: &str, sequential: bool) -> CoordinationResult<()> {
    let bad = || CoordinationError::BadPath(path.to_string());
    if !path.starts_with('/') {
        return Err(bad());
    }
    if path == ROOT {
        return Ok(());
    }
    // Sequential creates may end in '/' and get a numeric name
    let body = if sequential {
        path.trim_end_matches('/')
    } else {
        path
    };
    if body
        .split('/')
        .skip(1)
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(bad());
    }
    Ok(())
}

/// Shared in-memory node tree.
///
/// Clones share the same tree, so one store can back many server sets and
/// sessions in a test.
#[derive(Clone)]
pub struct MemoryStore {
    tree: Arc<Mutex<Tree>>,
}

impl Debug for MemoryStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let tree = self.tree.lock();
        f.debug_struct("MemoryStore")
            .field("nodes", &tree.nodes.len())
            .field("sessions", &tree.sessions.len())
            .field("available", &tree.available)
            .finish()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tree: Arc::new(Mutex::new(Tree::new())),
        }
    }

    /// While unavailable, `connect` fails with `ConnectionLoss`. Existing
    /// sessions keep working.
    pub fn set_available(&self, available: bool) {
        self.tree.lock().available = available;
    }

    /// Expire a session as the server would after a missed heartbeat.
    pub fn expire_session(&self, session_id: i64) -> bool {
        let mut tree = self.tree.lock();
        let expired = tree.end_session(session_id, SessionEvent::Expired).is_ok();
        if expired {
            debug!(session_id, "Expired in-memory session");
        }
        expired
    }

    pub fn session_count(&self) -> usize {
        self.tree.lock().sessions.len()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.tree.lock().nodes.contains_key(path)
    }

    pub fn data(&self, path: &str) -> Option<Vec<u8>> {
        self.tree.lock().nodes.get(path).map(|node| node.data.clone())
    }

    pub fn acl(&self, path: &str) -> Option<Vec<Acl>> {
        self.tree.lock().nodes.get(path).map(|node| node.acl.clone())
    }

    pub fn children(&self, path: &str) -> Vec<String> {
        self.tree.lock().children_of(path)
    }
}

#[async_trait]
impl Connector for MemoryStore {
    type Session = MemorySession;

    async fn connect(
        &self,
        servers: &[String],
        _timeout: Duration,
    ) -> CoordinationResult<(MemorySession, SessionEvents)> {
        if servers.is_empty() {
            return Err(CoordinationError::ConnectionLoss(
                "no servers configured".to_string(),
            ));
        }

        let mut tree = self.tree.lock();
        if !tree.available {
            return Err(CoordinationError::ConnectionLoss(format!(
                "unable to reach {}",
                servers.join(",")
            )));
        }

        let session_id = tree.next_session_id;
        tree.next_session_id += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(SessionEvent::Connected);
        tree.sessions.insert(session_id, tx);

        debug!(session_id, servers = %servers.join(","), "Opened in-memory session");

        Ok((
            MemorySession {
                store: self.clone(),
                session_id,
            },
            rx,
        ))
    }
}

/// A session on a [`MemoryStore`].
#[derive(Debug)]
pub struct MemorySession {
    store: MemoryStore,
    session_id: i64,
}

impl MemorySession {
    pub fn id(&self) -> i64 {
        self.session_id
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn create(
        &self,
        path: &str,
        data: &[u8],
        mode: CreateMode,
        acl: &[Acl],
    ) -> CoordinationResult<String> {
        self.store
            .tree
            .lock()
            .create(self.session_id, path, data, mode, acl)
    }

    async fn exists(&self, path: &str) -> CoordinationResult<Option<Stat>> {
        let tree = self.store.tree.lock();
        tree.check_session(self.session_id)?;
        validate_path(path, false)?;
        Ok(tree.nodes.get(path).map(|node| tree.stat(path, node)))
    }

    async fn children(&self, path: &str) -> CoordinationResult<Vec<String>> {
        let tree = self.store.tree.lock();
        tree.check_session(self.session_id)?;
        validate_path(path, false)?;
        if !tree.nodes.contains_key(path) {
            return Err(CoordinationError::NoNode);
        }
        Ok(tree.children_of(path))
    }

    async fn children_watch(&self, path: &str) -> CoordinationResult<(Vec<String>, ChildWatch)> {
        let mut tree = self.store.tree.lock();
        tree.check_session(self.session_id)?;
        validate_path(path, false)?;
        if !tree.nodes.contains_key(path) {
            return Err(CoordinationError::NoNode);
        }

        let children = tree.children_of(path);
        let (tx, rx) = oneshot::channel();
        tree.child_watches
            .entry(path.to_string())
            .or_default()
            .push(Watcher {
                session_id: self.session_id,
                tx,
            });
        Ok((children, ChildWatch::new(rx)))
    }

    async fn get_data(&self, path: &str) -> CoordinationResult<(Vec<u8>, Stat)> {
        let tree = self.store.tree.lock();
        tree.check_session(self.session_id)?;
        validate_path(path, false)?;
        let node = tree.nodes.get(path).ok_or(CoordinationError::NoNode)?;
        Ok((node.data.clone(), tree.stat(path, node)))
    }

    async fn delete(&self, path: &str) -> CoordinationResult<()> {
        let mut tree = self.store.tree.lock();
        tree.check_session(self.session_id)?;
        tree.delete(path)
    }

    async fn close(&self) -> CoordinationResult<()> {
        self.store
            .tree
            .lock()
            .end_session(self.session_id, SessionEvent::Closed)
    }
}
