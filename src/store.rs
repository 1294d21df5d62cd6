//! Session persistence
//!
//! The core treats storage as a transactional collaborator: `insert`/`delete`
//! stage changes in a working set, `save` commits them, and a failed `save`
//! leaves the committed state untouched.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::types::Session;

/// Storage seam for sessions
pub trait SessionStore {
    /// Stage a session, replacing any staged session with the same id
    fn insert(&mut self, session: Session);

    /// Stage a deletion. Returns false if the id is unknown.
    fn delete(&mut self, id: Uuid) -> bool;

    /// Commit staged changes
    fn save(&mut self) -> Result<(), PersistenceError>;

    /// Drop staged changes and return to the last committed state
    fn rollback(&mut self);

    fn get(&self, id: Uuid) -> Option<Session>;

    /// Snapshot of all sessions, newest first
    fn sessions(&self) -> Vec<Session>;
}

impl<S: SessionStore + ?Sized> SessionStore for &mut S {
    fn insert(&mut self, session: Session) {
        (**self).insert(session)
    }

    fn delete(&mut self, id: Uuid) -> bool {
        (**self).delete(id)
    }

    fn save(&mut self) -> Result<(), PersistenceError> {
        (**self).save()
    }

    fn rollback(&mut self) {
        (**self).rollback()
    }

    fn get(&self, id: Uuid) -> Option<Session> {
        (**self).get(id)
    }

    fn sessions(&self) -> Vec<Session> {
        (**self).sessions()
    }
}

fn newest_first(map: &HashMap<Uuid, Session>) -> Vec<Session> {
    let mut sessions: Vec<Session> = map.values().cloned().collect();
    sessions.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    sessions
}

/// In-memory store with a working set and a committed set
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    working: HashMap<Uuid, Session>,
    committed: HashMap<Uuid, Session>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store whose committed state is `sessions`
    pub fn from_sessions(sessions: Vec<Session>) -> Self {
        let committed: HashMap<Uuid, Session> =
            sessions.into_iter().map(|s| (s.id, s)).collect();
        Self {
            working: committed.clone(),
            committed,
        }
    }

    /// True when staged changes differ from the committed state
    pub fn has_changes(&self) -> bool {
        self.working != self.committed
    }

    /// Committed sessions, newest first
    pub fn committed_sessions(&self) -> Vec<Session> {
        newest_first(&self.committed)
    }
}

impl SessionStore for MemoryStore {
    fn insert(&mut self, session: Session) {
        self.working.insert(session.id, session);
    }

    fn delete(&mut self, id: Uuid) -> bool {
        self.working.remove(&id).is_some()
    }

    fn save(&mut self) -> Result<(), PersistenceError> {
        self.committed = self.working.clone();
        Ok(())
    }

    fn rollback(&mut self) {
        self.working = self.committed.clone();
    }

    fn get(&self, id: Uuid) -> Option<Session> {
        self.working.get(&id).cloned()
    }

    fn sessions(&self) -> Vec<Session> {
        newest_first(&self.working)
    }
}

/// On-disk layout of a store file
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    sessions: Vec<Session>,
}

/// Store persisted as a single JSON file.
///
/// Writes go to a temp file in the same directory, which is then renamed over
/// the target, so the file always holds a complete committed snapshot.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl JsonFileStore {
    /// Open a store file. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        let inner = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            let file: StoreFile = serde_json::from_str(&contents)?;
            log::debug!(
                "loaded {} sessions from {}",
                file.sessions.len(),
                path.display()
            );
            MemoryStore::from_sessions(file.sessions)
        } else {
            MemoryStore::new()
        };

        Ok(Self { path, inner })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_snapshot(&self, sessions: Vec<Session>) -> Result<(), PersistenceError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let serialized = serde_json::to_string_pretty(&StoreFile { sessions })?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(serialized.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl SessionStore for JsonFileStore {
    fn insert(&mut self, session: Session) {
        self.inner.insert(session);
    }

    fn delete(&mut self, id: Uuid) -> bool {
        self.inner.delete(id)
    }

    fn save(&mut self) -> Result<(), PersistenceError> {
        let snapshot = self.inner.sessions();
        let count = snapshot.len();
        if let Err(e) = self.write_snapshot(snapshot) {
            log::warn!("save to {} failed: {}", self.path.display(), e);
            return Err(e);
        }
        self.inner.save()?;
        log::info!("committed {} sessions to {}", count, self.path.display());
        Ok(())
    }

    fn rollback(&mut self) {
        self.inner.rollback();
    }

    fn get(&self, id: Uuid) -> Option<Session> {
        self.inner.get(id)
    }

    fn sessions(&self) -> Vec<Session> {
        self.inner.sessions()
    }
}

/// Delete one session and commit
pub fn delete_session<S: SessionStore>(store: &mut S, id: Uuid) -> Result<(), PersistenceError> {
    if !store.delete(id) {
        return Err(PersistenceError::SessionNotFound(id));
    }
    store.save()
}

/// Delete every session and commit
pub fn clear_all<S: SessionStore>(store: &mut S) -> Result<usize, PersistenceError> {
    let ids: Vec<Uuid> = store.sessions().iter().map(|s| s.id).collect();
    for id in &ids {
        store.delete(*id);
    }
    store.save()?;
    Ok(ids.len())
}
