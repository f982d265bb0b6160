//! Transfer registries: the map from [`TransferId`] to [`TransferSession`].
//!
//! A registry is the only owner of sessions. Callers never keep a session
//! reference; every operation resolves the id again and mutates the
//! session inside [`TransferRegistry::with_session`], which linearizes all
//! operations on the same transfer.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::warn;

use crate::TransferError;
use crate::session::TransferSession;
use crate::types::{IdentifierAllocator, RandomIdAllocator, TransferId};

/// Storage and locking discipline for transfer sessions.
pub trait TransferRegistry: Send + Sync {
    /// Registers a new, empty session under a fresh identifier.
    fn create(&self) -> TransferId;

    /// Runs `f` on the session of `id` while holding that session's lock.
    fn with_session<T, F>(&self, id: &TransferId, f: F) -> Result<T, TransferError>
    where
        F: FnOnce(&mut TransferSession) -> T;

    fn contains(&self, id: &TransferId) -> bool;

    /// Number of registered transfers.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Locks `mutex`, recovering the guard if a previous holder panicked.
///
/// Session transitions never leave a half-written state behind, so the
/// data is still consistent after a poisoning panic.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Inserts a fresh session, redrawing the id if it collides with a live one.
fn insert_fresh<V>(
    map: &mut HashMap<TransferId, V>,
    allocator: &dyn IdentifierAllocator,
    make: impl Fn() -> V,
) -> TransferId {
    loop {
        let id = allocator.new_identifier();
        match map.entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(make());
                return id;
            }
            Entry::Occupied(_) => {
                warn!(%id, "allocated transfer id collides with a live transfer, retrying");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// CoarseRegistry
// ---------------------------------------------------------------------------

/// One mutex over the whole map and every session in it.
///
/// All operations on all transfers are serialized.
pub struct CoarseRegistry {
    sessions: Mutex<HashMap<TransferId, TransferSession>>,
    allocator: Box<dyn IdentifierAllocator>,
}

impl CoarseRegistry {
    pub fn new() -> Self {
        Self::with_allocator(Box::new(RandomIdAllocator))
    }

    pub fn with_allocator(allocator: Box<dyn IdentifierAllocator>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            allocator,
        }
    }
}

impl Default for CoarseRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferRegistry for CoarseRegistry {
    fn create(&self) -> TransferId {
        let mut sessions = lock(&self.sessions);
        insert_fresh(&mut *sessions, self.allocator.as_ref(), TransferSession::new)
    }

    fn with_session<T, F>(&self, id: &TransferId, f: F) -> Result<T, TransferError>
    where
        F: FnOnce(&mut TransferSession) -> T,
    {
        let mut sessions = lock(&self.sessions);
        let session = sessions
            .get_mut(id)
            .ok_or(TransferError::UnknownTransfer(*id))?;
        Ok(f(session))
    }

    fn contains(&self, id: &TransferId) -> bool {
        lock(&self.sessions).contains_key(id)
    }

    fn len(&self) -> usize {
        lock(&self.sessions).len()
    }
}

// ---------------------------------------------------------------------------
// ShardedRegistry
// ---------------------------------------------------------------------------

/// Read/write lock over the map plus one mutex per session.
///
/// The map lock is held only long enough to resolve the id; operations on
/// different transfers then proceed in parallel while operations on the
/// same transfer are still serialized by its session mutex. Sessions are
/// never removed, so a resolved handle stays the registered one.
pub struct ShardedRegistry {
    sessions: RwLock<HashMap<TransferId, Arc<Mutex<TransferSession>>>>,
    allocator: Box<dyn IdentifierAllocator>,
}

impl ShardedRegistry {
    pub fn new() -> Self {
        Self::with_allocator(Box::new(RandomIdAllocator))
    }

    pub fn with_allocator(allocator: Box<dyn IdentifierAllocator>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            allocator,
        }
    }

    fn resolve(&self, id: &TransferId) -> Option<Arc<Mutex<TransferSession>>> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions.get(id).cloned()
    }
}

impl Default for ShardedRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferRegistry for ShardedRegistry {
    fn create(&self) -> TransferId {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        insert_fresh(&mut *sessions, self.allocator.as_ref(), || {
            Arc::new(Mutex::new(TransferSession::new()))
        })
    }

    fn with_session<T, F>(&self, id: &TransferId, f: F) -> Result<T, TransferError>
    where
        F: FnOnce(&mut TransferSession) -> T,
    {
        let session = self
            .resolve(id)
            .ok_or(TransferError::UnknownTransfer(*id))?;
        let mut guard = lock(&*session);
        Ok(f(&mut *guard))
    }

    fn contains(&self, id: &TransferId) -> bool {
        self.resolve(id).is_some()
    }

    fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
