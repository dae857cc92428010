//! Poison-tolerant lock access.
//!
//! Cache state is always re-derivable from storage, so a panic in another
//! thread never makes it unusable: the guard is recovered and a warning is
//! logged.

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

pub(crate) fn read<'a, T>(lock: &'a RwLock<T>, site: &'static str) -> RwLockReadGuard<'a, T> {
    lock.read()
        .unwrap_or_else(|poisoned| recover(poisoned, site, "rwlock.read"))
}

pub(crate) fn write<'a, T>(lock: &'a RwLock<T>, site: &'static str) -> RwLockWriteGuard<'a, T> {
    lock.write()
        .unwrap_or_else(|poisoned| recover(poisoned, site, "rwlock.write"))
}

pub(crate) fn lock<'a, T>(lock: &'a Mutex<T>, site: &'static str) -> MutexGuard<'a, T> {
    lock.lock()
        .unwrap_or_else(|poisoned| recover(poisoned, site, "mutex.lock"))
}

fn recover<G>(poisoned: PoisonError<G>, site: &'static str, lock_kind: &'static str) -> G {
    warn!(
        site,
        lock_kind,
        result = "poisoned_recovered",
        hint = "state may be stale after panic in another thread",
        "Recovered from poisoned lock"
    );
    poisoned.into_inner()
}
