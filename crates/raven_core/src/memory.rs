//! crates/raven_core/src/memory.rs
//!
//! In-process implementations of the storage ports, for tests and for running
//! the journal without any backing service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use async_trait::async_trait;
use uuid::Uuid;
use crate::domain::Poem;
use crate::ports::{CloudStatus, LocalStore, PoemRepository, PortError, PortResult};

fn poisoned<T>(_: T) -> PortError {
    PortError::Unexpected("memory store lock poisoned".to_string())
}

#[derive(Default)]
pub struct MemoryLocalStore {
    values: Mutex<HashMap<String, serde_json::Value>>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryLocalStore {
    fn get(&self, key: &str) -> PortResult<Option<serde_json::Value>> {
        Ok(self.values.lock().map_err(poisoned)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: serde_json::Value) -> PortResult<()> {
        self.values.lock().map_err(poisoned)?.insert(key.to_string(), value);
        Ok(())
    }
}

/// A poems table keyed by poem id. An upsert from a user other than the
/// row's owner is ignored. `set_offline(true)` makes every call fail, to
/// exercise the fallback paths.
#[derive(Default)]
pub struct MemoryPoemRepository {
    rows: Mutex<HashMap<Uuid, (Uuid, Poem)>>,
    offline: AtomicBool,
}

impl MemoryPoemRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> PortResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("cloud unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PoemRepository for MemoryPoemRepository {
    async fn upsert_poem(&self, user_id: Uuid, poem: &Poem) -> PortResult<()> {
        self.upsert_poems(user_id, std::slice::from_ref(poem)).await
    }

    async fn upsert_poems(&self, user_id: Uuid, poems: &[Poem]) -> PortResult<()> {
        self.check_online()?;
        let mut rows = self.rows.lock().map_err(poisoned)?;
        for poem in poems {
            match rows.get(&poem.id) {
                // A poem never changes owner.
                Some((owner, _)) if *owner != user_id => continue,
                _ => {
                    rows.insert(poem.id, (user_id, poem.clone()));
                }
            }
        }
        Ok(())
    }

    async fn list_poems_for_user(&self, user_id: Uuid) -> PortResult<Vec<Poem>> {
        self.check_online()?;
        let rows = self.rows.lock().map_err(poisoned)?;
        let mut poems: Vec<Poem> = rows
            .values()
            .filter(|(owner, _)| *owner == user_id)
            .map(|(_, poem)| poem.clone())
            .collect();
        poems.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(poems)
    }

    async fn health(&self) -> CloudStatus {
        match self.check_online() {
            Ok(()) => CloudStatus::Connected,
            Err(e) => CloudStatus::Error {
                message: e.to_string(),
            },
        }
    }
}
