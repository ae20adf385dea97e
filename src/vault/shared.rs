//! The single in-memory database and its change signal
//!
//! Every component that reads or changes the vault goes through a
//! [`SharedDatabase`] handle. Mutations bump `meta.revision` and publish the
//! new revision on a watch channel, which the sync engine listens to for
//! debounced auto-save.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::watch;

use crate::error::TraekyResult;
use crate::models::VaultDatabase;

/// Cloneable handle to the process-wide vault database
#[derive(Debug, Clone)]
pub struct SharedDatabase {
    db: Arc<RwLock<VaultDatabase>>,
    revision_tx: Arc<watch::Sender<u64>>,
}

impl SharedDatabase {
    pub fn new(db: VaultDatabase) -> Self {
        let (revision_tx, _) = watch::channel(db.revision());
        Self {
            db: Arc::new(RwLock::new(db)),
            revision_tx: Arc::new(revision_tx),
        }
    }

    // A poisoned lock still holds a consistent database: every mutation
    // below is applied in full before the guard drops.
    fn read_guard(&self) -> RwLockReadGuard<'_, VaultDatabase> {
        self.db.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, VaultDatabase> {
        self.db.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Run a read-only closure against the database
    pub fn read<R>(&self, f: impl FnOnce(&VaultDatabase) -> R) -> R {
        f(&self.read_guard())
    }

    /// Clone of the current state
    pub fn snapshot(&self) -> VaultDatabase {
        self.read_guard().clone()
    }

    pub fn revision(&self) -> u64 {
        self.read_guard().revision()
    }

    /// Apply a change, counting it as one mutation
    pub fn mutate<R>(&self, f: impl FnOnce(&mut VaultDatabase) -> R) -> R {
        self.mutate_if(|db| Some(f(db)))
            .unwrap_or_else(|| unreachable!("mutate closure always yields a value"))
    }

    /// Apply a change that may decide not to happen
    ///
    /// The revision is bumped only when `f` returns `Some`; `f` must leave the
    /// database untouched when it returns `None`.
    pub fn mutate_if<R>(&self, f: impl FnOnce(&mut VaultDatabase) -> Option<R>) -> Option<R> {
        let (result, revision) = {
            let mut db = self.write_guard();
            let result = f(&mut db)?;
            db.bump_revision();
            (result, db.revision())
        };
        self.revision_tx.send_replace(revision);
        Some(result)
    }

    /// Apply a fallible change; an error leaves the revision alone
    pub fn try_mutate<R>(
        &self,
        f: impl FnOnce(&mut VaultDatabase) -> TraekyResult<R>,
    ) -> TraekyResult<R> {
        let mut outcome = None;
        let applied = self.mutate_if(|db| match f(db) {
            Ok(value) => Some(value),
            Err(e) => {
                outcome = Some(e);
                None
            }
        });
        match (applied, outcome) {
            (Some(value), _) => Ok(value),
            (None, Some(e)) => Err(e),
            (None, None) => unreachable!("try_mutate closure yields a value or an error"),
        }
    }

    /// Swap in a whole new database (open, create new, initial load)
    pub fn replace(&self, db: VaultDatabase) {
        let revision = db.revision();
        *self.write_guard() = db;
        self.revision_tx.send_replace(revision);
    }

    /// Receive the revision after every mutation or replacement
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision_tx.subscribe()
    }
}

impl Default for SharedDatabase {
    fn default() -> Self {
        Self::new(VaultDatabase::empty("en"))
    }
}
