use crate::domain::course::{CourseId, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, OwnedMutexGuard};

type PairKey = (UserId, CourseId);

/// Prune dead registry entries once the map grows past this size.
const PRUNE_THRESHOLD: usize = 1024;

/// Registry of per-(user, course) mutexes.
///
/// Requests for the same pair are serialized; requests for different pairs
/// never contend beyond the short registry lookup. Entries are held weakly,
/// so a pair's mutex lives only while some unit of work holds or awaits it.
#[derive(Default, Clone)]
pub struct PairLocks {
    registry: Arc<Mutex<HashMap<PairKey, Weak<Mutex<()>>>>>,
}

/// Held for the lifetime of a unit of work. Dropping it releases the pair.
pub struct PairGuard {
    key: PairKey,
    _guard: OwnedMutexGuard<()>,
}

impl PairGuard {
    pub fn key(&self) -> &PairKey {
        &self.key
    }
}

impl PairLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, user: &UserId, course: &CourseId) -> PairGuard {
        let key = (user.clone(), course.clone());
        let mutex = {
            let mut registry = self.registry.lock().await;
            if registry.len() >= PRUNE_THRESHOLD {
                registry.retain(|_, entry| entry.strong_count() > 0);
            }
            match registry.get(&key).and_then(Weak::upgrade) {
                Some(mutex) => mutex,
                None => {
                    let mutex = Arc::new(Mutex::new(()));
                    registry.insert(key.clone(), Arc::downgrade(&mutex));
                    mutex
                }
            }
        };
        PairGuard {
            key,
            _guard: mutex.lock_owned().await,
        }
    }
}
