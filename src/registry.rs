//! Connection registry: one lazily opened handle per database name.
//!
//! Each name maps to a slot holding a `OnceCell`, so concurrent first acquisitions of the same
//! name share a single connect. A failed connect leaves the cell empty and the next caller
//! retries. A slot released while its connect is in flight is closed by the acquirer, which
//! then starts over with a fresh slot.

use crate::error::AppError;
use crate::store::names::check_database;
use crate::store::{Connector, Database};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OnceCell;

#[derive(Default)]
struct Slot {
    cell: OnceCell<Arc<dyn Database>>,
    closed: AtomicBool,
}

impl Slot {
    /// Close the handle if one was opened. Only the first caller closes; returns whether it did.
    async fn close(&self) -> bool {
        match self.cell.get() {
            Some(handle) if !self.closed.swap(true, Ordering::SeqCst) => {
                handle.close().await;
                true
            }
            _ => false,
        }
    }
}

type Handles = HashMap<String, Arc<Slot>>;

pub struct ConnectionRegistry {
    connector: Arc<dyn Connector>,
    handles: Mutex<Handles>,
}

impl ConnectionRegistry {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        ConnectionRegistry {
            connector,
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    fn lock(&self) -> Result<MutexGuard<'_, Handles>, AppError> {
        self.handles
            .lock()
            .map_err(|_| AppError::Store("connection registry lock poisoned".into()))
    }

    fn slot(&self, database: &str) -> Result<Arc<Slot>, AppError> {
        Ok(self.lock()?.entry(database.to_string()).or_default().clone())
    }

    fn is_registered(&self, database: &str, slot: &Arc<Slot>) -> Result<bool, AppError> {
        Ok(self.lock()?.get(database).is_some_and(|s| Arc::ptr_eq(s, slot)))
    }

    fn take(&self, database: &str) -> Option<Arc<Slot>> {
        self.lock().ok().and_then(|mut handles| handles.remove(database))
    }

    /// Existing handle for `database`, or a newly opened one.
    pub async fn acquire(&self, database: &str) -> Result<Arc<dyn Database>, AppError> {
        check_database(database)?;
        loop {
            let slot = self.slot(database)?;
            let handle = slot
                .cell
                .get_or_try_init(|| async {
                    tracing::debug!(database, "opening connection");
                    self.connector.connect(database).await.map_err(|e| match e {
                        e @ (AppError::BadIdentifier(_) | AppError::Connection { .. }) => e,
                        e => AppError::Connection {
                            database: database.to_string(),
                            cause: e.to_string(),
                        },
                    })
                })
                .await?
                .clone();
            if self.is_registered(database, &slot)? {
                return Ok(handle);
            }
            tracing::debug!(database, "handle released while connecting, reopening");
            slot.close().await;
        }
    }

    /// Names with an open handle, sorted.
    pub fn open_databases(&self) -> Vec<String> {
        let Ok(handles) = self.lock() else {
            return Vec::new();
        };
        let mut names: Vec<String> = handles
            .iter()
            .filter(|(_, slot)| slot.cell.initialized())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Close and forget the handle for one database. Returns false when none was open.
    pub async fn release(&self, database: &str) -> bool {
        match self.take(database) {
            Some(slot) => slot.close().await,
            None => false,
        }
    }

    /// Close every handle and clear the registry. Later `acquire` calls reopen on demand.
    pub async fn close_all(&self) {
        let drained: Vec<(String, Arc<Slot>)> = match self.lock() {
            Ok(mut handles) => handles.drain().collect(),
            Err(_) => Vec::new(),
        };
        for (name, slot) in drained {
            if slot.close().await {
                tracing::debug!(database = %name, "released connection");
            }
        }
    }
}
