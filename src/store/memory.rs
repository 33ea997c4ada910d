//! In-process document store. Data lives in the connector and every handle reads it
//! through the same map, so a database exists only once something has been written to it.

use crate::error::AppError;
use crate::query::{compare_values, lookup_path, SortDirection, TranslatedQuery};
use crate::store::{index_name, Connector, Database, Document, ID_FIELD};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Default)]
struct MemoryCollection {
    /// Keyed by `_id`, so unsorted reads come back in identifier order.
    docs: BTreeMap<String, Document>,
    indexes: BTreeSet<String>,
}

type Collections = BTreeMap<String, MemoryCollection>;

/// Database name -> collections.
type Databases = Arc<RwLock<BTreeMap<String, Collections>>>;

#[derive(Default)]
struct Counters {
    opens: AtomicUsize,
    closes: AtomicUsize,
}

pub struct MemoryConnector {
    databases: Databases,
    counters: Arc<Counters>,
    reachable: AtomicBool,
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConnector {
    pub fn new() -> Self {
        MemoryConnector {
            databases: Arc::new(RwLock::new(BTreeMap::new())),
            counters: Arc::new(Counters::default()),
            reachable: AtomicBool::new(true),
        }
    }

    /// Number of handles opened so far.
    pub fn open_count(&self) -> usize {
        self.counters.opens.load(AtomicOrdering::SeqCst)
    }

    /// Number of handles closed so far.
    pub fn close_count(&self) -> usize {
        self.counters.closes.load(AtomicOrdering::SeqCst)
    }

    /// Simulate the store going away (false) or coming back (true).
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, AtomicOrdering::SeqCst);
    }

    fn check_reachable(&self) -> Result<(), AppError> {
        if self.reachable.load(AtomicOrdering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::Store("memory store is unreachable".into()))
        }
    }
}

fn poisoned<T>(_: PoisonError<T>) -> AppError {
    AppError::Store("memory store lock poisoned".into())
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, database: &str) -> Result<Arc<dyn Database>, AppError> {
        self.check_reachable()?;
        // Suspension point, like the network round trip of a real connect.
        tokio::task::yield_now().await;
        self.counters.opens.fetch_add(1, AtomicOrdering::SeqCst);
        tracing::debug!(database, "memory handle opened");
        Ok(Arc::new(MemoryDatabase {
            name: database.to_string(),
            databases: self.databases.clone(),
            counters: self.counters.clone(),
        }))
    }

    async fn list_databases(&self) -> Result<Vec<String>, AppError> {
        self.check_reachable()?;
        let dbs = self.databases.read().map_err(poisoned)?;
        Ok(dbs.keys().cloned().collect())
    }

    async fn drop_database(&self, database: &str) -> Result<bool, AppError> {
        self.check_reachable()?;
        let mut dbs = self.databases.write().map_err(poisoned)?;
        Ok(dbs.remove(database).is_some())
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.check_reachable()
    }
}

pub struct MemoryDatabase {
    name: String,
    databases: Databases,
    counters: Arc<Counters>,
}

impl MemoryDatabase {
    /// Read access. None when the database has never been written.
    fn read<T>(&self, f: impl FnOnce(Option<&Collections>) -> T) -> Result<T, AppError> {
        let guard = self.databases.read().map_err(poisoned)?;
        Ok(f(guard.get(&self.name)))
    }

    /// Write access that leaves an absent database absent.
    fn write_existing<T>(&self, f: impl FnOnce(Option<&mut Collections>) -> T) -> Result<T, AppError> {
        let mut guard = self.databases.write().map_err(poisoned)?;
        Ok(f(guard.get_mut(&self.name)))
    }

    /// Write access that creates the database on first use.
    fn write<T>(&self, f: impl FnOnce(&mut Collections) -> T) -> Result<T, AppError> {
        let mut guard = self.databases.write().map_err(poisoned)?;
        Ok(f(guard.entry(self.name.clone()).or_default()))
    }

    fn with_collection<T>(
        &self,
        collection: &str,
        f: impl FnOnce(Option<&MemoryCollection>) -> T,
    ) -> Result<T, AppError> {
        self.read(|db| f(db.and_then(|db| db.get(collection))))
    }

    /// Mutate an existing collection. None when the database or collection is absent.
    fn with_existing_collection<T>(
        &self,
        collection: &str,
        f: impl FnOnce(&mut MemoryCollection) -> T,
    ) -> Result<Option<T>, AppError> {
        self.write_existing(|db| db.and_then(|db| db.get_mut(collection)).map(f))
    }

    fn with_collection_mut<T>(
        &self,
        collection: &str,
        f: impl FnOnce(&mut MemoryCollection) -> T,
    ) -> Result<T, AppError> {
        self.write(|db| f(db.entry(collection.to_string()).or_default()))
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_collections(&self) -> Result<Vec<String>, AppError> {
        self.read(|db| db.map(|db| db.keys().cloned().collect()).unwrap_or_default())
    }

    async fn create_collection(&self, collection: &str) -> Result<bool, AppError> {
        self.write(|db| {
            if db.contains_key(collection) {
                return false;
            }
            db.insert(collection.to_string(), MemoryCollection::default());
            true
        })
    }

    async fn drop_collection(&self, collection: &str) -> Result<bool, AppError> {
        self.write_existing(|db| db.is_some_and(|db| db.remove(collection).is_some()))
    }

    async fn find(&self, collection: &str, query: &TranslatedQuery) -> Result<Vec<Document>, AppError> {
        let mut docs: Vec<Document> = self.with_collection(collection, |c| {
            c.map(|c| c.docs.values().filter(|d| query.matches(d)).cloned().collect())
                .unwrap_or_default()
        })?;
        if !query.sort.is_empty() {
            docs.sort_by(|a, b| compare_docs(a, b, &query.sort));
        }
        let skip = query.skip.unwrap_or(0) as usize;
        let limit = query.limit.map(|n| n as usize).unwrap_or(usize::MAX);
        Ok(docs.into_iter().skip(skip).take(limit).collect())
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>, AppError> {
        self.with_collection(collection, |c| c.and_then(|c| c.docs.get(id).cloned()))
    }

    async fn insert(&self, collection: &str, doc: Document) -> Result<Document, AppError> {
        let id = doc_id(&doc)?;
        self.with_collection_mut(collection, |c| {
            if c.docs.contains_key(&id) {
                return Err(AppError::Conflict(format!("duplicate _id '{}'", id)));
            }
            c.docs.insert(id, doc.clone());
            Ok(doc)
        })?
    }

    async fn replace(&self, collection: &str, id: &str, doc: Document) -> Result<Option<Document>, AppError> {
        let replaced = self.with_existing_collection(collection, |c| {
            c.docs.get_mut(id).map(|slot| {
                *slot = doc.clone();
                doc
            })
        })?;
        Ok(replaced.flatten())
    }

    async fn upsert(&self, collection: &str, id: &str, doc: Document) -> Result<(Document, bool), AppError> {
        self.with_collection_mut(collection, |c| {
            let created = c.docs.insert(id.to_string(), doc.clone()).is_none();
            (doc, created)
        })
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, AppError> {
        let removed = self.with_existing_collection(collection, |c| c.docs.remove(id).is_some())?;
        Ok(removed.unwrap_or(false))
    }

    async fn count(&self, collection: &str, query: &TranslatedQuery) -> Result<u64, AppError> {
        self.with_collection(collection, |c| {
            c.map(|c| c.docs.values().filter(|d| query.matches(d)).count() as u64)
                .unwrap_or(0)
        })
    }

    async fn create_index(&self, collection: &str, field: &str) -> Result<String, AppError> {
        let name = index_name(collection, field);
        self.with_collection_mut(collection, |c| {
            c.indexes.insert(name.clone());
        })?;
        Ok(name)
    }

    async fn drop_index(&self, collection: &str, field: &str) -> Result<bool, AppError> {
        let name = index_name(collection, field);
        let dropped = self.with_existing_collection(collection, |c| c.indexes.remove(&name))?;
        Ok(dropped.unwrap_or(false))
    }

    async fn stats(&self) -> Result<Value, AppError> {
        let (collections, objects, indexes) = self.read(|db| {
            db.map(|db| {
                (
                    db.len(),
                    db.values().map(|c| c.docs.len()).sum::<usize>(),
                    db.values().map(|c| c.indexes.len()).sum::<usize>(),
                )
            })
            .unwrap_or_default()
        })?;
        Ok(json!({
            "db": self.name,
            "collections": collections,
            "objects": objects,
            "indexes": indexes,
        }))
    }

    async fn close(&self) {
        self.counters.closes.fetch_add(1, AtomicOrdering::SeqCst);
        tracing::debug!(database = %self.name, "memory handle closed");
    }
}

fn doc_id(doc: &Document) -> Result<String, AppError> {
    doc.get(ID_FIELD)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AppError::Validation("document has no string _id".into()))
}

fn compare_docs(a: &Document, b: &Document, sort: &[(String, SortDirection)]) -> Ordering {
    for (field, dir) in sort {
        let ord = compare_present(lookup_path(a, field), lookup_path(b, field));
        let ord = match dir {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Missing sorts after every value, like SQL NULLs in ascending order.
fn compare_present(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => compare_values(a, b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
