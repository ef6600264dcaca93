//! Watching a server set
//!
//! A [`Watch`] keeps the sorted `host:port` list of ALIVE members current. It
//! lists the member directory with a child watch, reads every member node,
//! and repeats whenever the watch fires. Watching never creates nodes: the
//! directory chain has to exist already.

use std::sync::Arc;

use serverset_api::{Entity, join_path};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::coordinator::{ChildWatch, Connector, CoordinationResult, NodeEventKind, Session};
use crate::error::{CoordinationError, Result, ServerSetError};
use crate::serverset::ServerSet;

/// Live view of a server set's ALIVE endpoints.
///
/// The background refresh stops when the watch is closed or dropped, or when
/// its session ends. Dropping the watch also closes its session.
pub struct Watch<S: Session> {
    session: Arc<S>,
    endpoints: watch::Receiver<Vec<String>>,
    task: JoinHandle<()>,
    closed: bool,
}

impl<S: Session> Watch<S> {
    /// Current endpoints, sorted.
    pub fn endpoints(&self) -> Vec<String> {
        self.endpoints.borrow().clone()
    }

    /// Wait until the endpoint list changes and return the new list.
    pub async fn changed(&mut self) -> Result<Vec<String>> {
        self.endpoints
            .changed()
            .await
            .map_err(|_| ServerSetError::WatchClosed)?;
        Ok(self.endpoints.borrow_and_update().clone())
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// Another receiver of the same endpoint list.
    pub fn subscribe(&self) -> watch::Receiver<Vec<String>> {
        self.endpoints.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop refreshing and close the session.
    pub async fn close(mut self) -> Result<()> {
        self.task.abort();
        self.closed = true;
        match self.session.close().await {
            Ok(()) | Err(CoordinationError::SessionExpired) => Ok(()),
            Err(e) => Err(ServerSetError::Connection(e)),
        }
    }
}

impl<S: Session> Drop for Watch<S> {
    fn drop(&mut self) {
        self.task.abort();
        if self.closed {
            return;
        }

        let Ok(handle) = Handle::try_current() else {
            warn!("No runtime to close dropped watch session");
            return;
        };
        let session = self.session.clone();
        handle.spawn(async move {
            match session.close().await {
                Ok(()) | Err(CoordinationError::SessionExpired) => {}
                Err(e) => warn!(error = %e, "Failed to close dropped watch session"),
            }
        });
    }
}

impl<C: Connector> ServerSet<C> {
    /// Start watching the server set's members.
    ///
    /// Fails with `NotFound` if the directory chain has not been created yet.
    pub async fn watch(&self) -> Result<Watch<C::Session>> {
        let (session, _events) = self.connect().await?;
        let session = Arc::new(session);

        match self.start_watch(&session).await {
            Ok((endpoints, task)) => {
                info!(
                    path = %self.directory_path(),
                    members = endpoints.borrow().len(),
                    "Watching server set"
                );
                Ok(Watch {
                    session,
                    endpoints,
                    task,
                    closed: false,
                })
            }
            Err(e) => {
                if let Err(close_err) = session.close().await {
                    warn!(error = %close_err, "Failed to close watch session");
                }
                Err(e)
            }
        }
    }

    async fn start_watch(
        &self,
        session: &Arc<C::Session>,
    ) -> Result<(watch::Receiver<Vec<String>>, JoinHandle<()>)> {
        self.verify_hierarchy(session).await?;

        let directory = self.directory_path().to_string();
        let prefix = self.member_prefix().to_string();

        let (children, pending) = session
            .children_watch(&directory)
            .await
            .map_err(|e| ServerSetError::at(&directory, e))?;
        let initial = alive_endpoints(session.as_ref(), &directory, &prefix, &children)
            .await
            .map_err(|e| ServerSetError::at(&directory, e))?;

        let (tx, rx) = watch::channel(initial);
        let task = tokio::spawn(refresh_loop(
            session.clone(),
            directory,
            prefix,
            pending,
            tx,
        ));
        Ok((rx, task))
    }
}

async fn refresh_loop<S: Session>(
    session: Arc<S>,
    directory: String,
    prefix: String,
    mut pending: ChildWatch,
    tx: watch::Sender<Vec<String>>,
) {
    loop {
        match pending.changed().await {
            Ok(event) if event.kind == NodeEventKind::NodeDeleted => {
                info!(path = %directory, "Server set directory deleted, stopping watch");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                info!(path = %directory, error = %e, "Server set watch ended");
                break;
            }
        }

        let children = match session.children_watch(&directory).await {
            Ok((children, next)) => {
                pending = next;
                children
            }
            Err(e) => {
                warn!(path = %directory, error = %e, "Failed to re-list server set members");
                break;
            }
        };

        match alive_endpoints(session.as_ref(), &directory, &prefix, &children).await {
            Ok(endpoints) => {
                let changed = tx.send_if_modified(|current| {
                    if *current == endpoints {
                        false
                    } else {
                        *current = endpoints;
                        true
                    }
                });
                if changed {
                    debug!(path = %directory, members = tx.borrow().len(), "Server set changed");
                }
            }
            Err(e) => {
                warn!(path = %directory, error = %e, "Failed to read server set members");
                break;
            }
        }

        if tx.is_closed() {
            break;
        }
    }
}

/// Read the member nodes among `children` and collect the ALIVE endpoints.
async fn alive_endpoints<S: Session + ?Sized>(
    session: &S,
    directory: &str,
    prefix: &str,
    children: &[String],
) -> CoordinationResult<Vec<String>> {
    let mut endpoints = Vec::new();

    for child in children.iter().filter(|c| c.starts_with(prefix)) {
        let path = join_path(directory, child);
        let data = match session.get_data(&path).await {
            Ok((data, _)) => data,
            // Left between listing and reading
            Err(CoordinationError::NoNode) => continue,
            Err(e) => return Err(e),
        };

        match Entity::from_json(&data) {
            Ok(entity) if entity.status.is_alive() => {
                endpoints.push(entity.service_endpoint.to_string());
            }
            Ok(_) => {}
            Err(e) => warn!(path = %path, error = %e, "Skipping undecodable member"),
        }
    }

    endpoints.sort();
    Ok(endpoints)
}
