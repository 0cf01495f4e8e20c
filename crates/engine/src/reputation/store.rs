//! Trust store: versioned per-submitter records with compare-and-update.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::config::ReputationParams;
use crate::error::TrustStoreError;
use crate::report::UserId;

use super::{TrustSnapshot, TrustState, TrustUpdate};

/// External trust collaborator.
pub trait TrustStore: Send + Sync {
    /// Current snapshot. Unknown submitters read as the initial state at
    /// version 0; reading never creates a record.
    fn read(&self, user: UserId) -> Result<TrustSnapshot, TrustStoreError>;

    /// Apply `update` if the record is still at `expected_version`.
    ///
    /// Returns the new snapshot, or [`TrustStoreError::Conflict`] when another
    /// writer got there first. Nothing is written on conflict.
    fn compare_and_update(
        &self,
        user: UserId,
        expected_version: u64,
        update: &TrustUpdate,
    ) -> Result<TrustSnapshot, TrustStoreError>;
}

const SHARD_COUNT: usize = 16;

#[derive(Debug, Clone, Copy)]
struct Entry {
    state: TrustState,
    version: u64,
}

type Shard = RwLock<HashMap<UserId, Arc<Mutex<Entry>>>>;

/// Sharded in-memory store.
///
/// Each submitter's record sits behind its own mutex; the shard map lock is
/// held only to find or insert that mutex, so updates for different
/// submitters never wait on each other's record.
pub struct InMemoryTrustStore {
    params: ReputationParams,
    shards: Vec<Shard>,
}

impl InMemoryTrustStore {
    pub fn new(params: ReputationParams) -> Self {
        Self {
            params,
            shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, user: UserId) -> &Shard {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        user.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARD_COUNT]
    }

    fn entry(&self, user: UserId) -> Option<Arc<Mutex<Entry>>> {
        self.shard(user).read().get(&user).cloned()
    }

    fn entry_or_insert(&self, user: UserId) -> Arc<Mutex<Entry>> {
        if let Some(e) = self.entry(user) {
            return e;
        }
        let initial = Entry {
            state: TrustState::initial(&self.params),
            version: 0,
        };
        self.shard(user)
            .write()
            .entry(user)
            .or_insert_with(|| Arc::new(Mutex::new(initial)))
            .clone()
    }

    /// Number of submitters with a record.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored record, sorted by user.
    pub fn export(&self) -> Vec<TrustSnapshot> {
        let mut out: Vec<TrustSnapshot> = self
            .shards
            .iter()
            .flat_map(|shard| {
                shard
                    .read()
                    .iter()
                    .map(|(user, entry)| {
                        let e = *entry.lock();
                        TrustSnapshot {
                            user: *user,
                            state: e.state,
                            version: e.version,
                        }
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        out.sort_by_key(|s| s.user);
        out
    }

    /// Replace or insert records, keeping their versions.
    pub fn import(&self, snapshots: impl IntoIterator<Item = TrustSnapshot>) {
        for snap in snapshots {
            let entry = Entry {
                state: snap.state,
                version: snap.version,
            };
            self.shard(snap.user)
                .write()
                .insert(snap.user, Arc::new(Mutex::new(entry)));
        }
    }
}

impl TrustStore for InMemoryTrustStore {
    fn read(&self, user: UserId) -> Result<TrustSnapshot, TrustStoreError> {
        Ok(match self.entry(user) {
            Some(entry) => {
                let e = *entry.lock();
                TrustSnapshot {
                    user,
                    state: e.state,
                    version: e.version,
                }
            }
            None => TrustSnapshot::new_submitter(user, &self.params),
        })
    }

    fn compare_and_update(
        &self,
        user: UserId,
        expected_version: u64,
        update: &TrustUpdate,
    ) -> Result<TrustSnapshot, TrustStoreError> {
        let entry = self.entry_or_insert(user);
        let mut e = entry.lock();
        if e.version != expected_version {
            return Err(TrustStoreError::Conflict {
                expected: expected_version,
                found: e.version,
            });
        }
        e.state.apply(update);
        e.version += 1;
        Ok(TrustSnapshot {
            user,
            state: e.state,
            version: e.version,
        })
    }
}
