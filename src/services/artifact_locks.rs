//! Per-artifact async mutual exclusion.
//!
//! Transitions, flag changes, reminder cancellation and reminder delivery
//! for one artifact serialize on its lock; different artifacts never
//! contend. Entries are dropped from the map once nobody holds or waits on
//! them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct ArtifactLocks {
    locks: StdMutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

/// Held lock on one artifact. Released on drop.
pub struct ArtifactGuard<'a> {
    artifact_id: Uuid,
    owner: &'a ArtifactLocks,
    guard: Option<OwnedMutexGuard<()>>,
}

impl ArtifactLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `artifact_id`.
    pub async fn lock(&self, artifact_id: Uuid) -> ArtifactGuard<'_> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(artifact_id).or_default().clone()
        };
        let guard = mutex.lock_owned().await;
        ArtifactGuard {
            artifact_id,
            owner: self,
            guard: Some(guard),
        }
    }

    /// Number of artifacts with a live lock entry.
    pub fn active(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl ArtifactGuard<'_> {
    pub fn artifact_id(&self) -> Uuid {
        self.artifact_id
    }
}

impl Drop for ArtifactGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.owner.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Only the map holds it: no holder, no waiter
        if locks.get(&self.artifact_id).is_some_and(|m| Arc::strong_count(m) == 1) {
            locks.remove(&self.artifact_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_artifact_serializes() {
        let locks = Arc::new(ArtifactLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));
        let id = Uuid::new_v4();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                tokio::spawn(async move {
                    let _guard = locks.lock(id).await;
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn test_different_artifacts_do_not_block() {
        let locks = ArtifactLocks::new();
        let a = locks.lock(Uuid::new_v4()).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock(Uuid::new_v4())).await;
        assert!(b.is_ok());
        assert_eq!(locks.active(), 2);
        drop(b);
        drop(a);
        assert_eq!(locks.active(), 0);
    }
}
