use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Optional ceiling on concurrently live render surfaces.
///
/// Unbounded pools hand out permits immediately. A bounded pool makes
/// callers wait for a free slot; a job keeps its permit until its surface
/// is closed, so a slot is never shared between two live surfaces.
#[derive(Debug, Clone)]
pub struct SurfacePool {
    slots: Option<Arc<Semaphore>>,
    max: Option<usize>,
}

/// Held for as long as a surface is alive.
#[derive(Debug)]
pub struct SurfacePermit {
    _permit: Option<OwnedSemaphorePermit>,
}

impl SurfacePool {
    pub fn new(max_surfaces: Option<usize>) -> Self {
        // A zero ceiling would deadlock every job.
        let max = max_surfaces.map(|n| n.max(1));
        Self {
            slots: max.map(|n| Arc::new(Semaphore::new(n))),
            max,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn max_surfaces(&self) -> Option<usize> {
        self.max
    }

    /// Free slots, `None` when unbounded.
    pub fn available(&self) -> Option<usize> {
        self.slots.as_ref().map(|s| s.available_permits())
    }

    pub async fn acquire(&self) -> SurfacePermit {
        let permit = match &self.slots {
            // The semaphore is never closed, so acquiring cannot fail.
            Some(slots) => slots.clone().acquire_owned().await.ok(),
            None => None,
        };
        SurfacePermit { _permit: permit }
    }
}

impl Default for SurfacePool {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_unbounded_never_waits() {
        let pool = SurfacePool::unbounded();
        let _a = pool.acquire().await;
        let _b = pool.acquire().await;
        assert_eq!(pool.available(), None);
    }

    #[tokio::test]
    async fn test_bounded_waits_for_checkin() {
        let pool = SurfacePool::new(Some(1));
        let first = pool.acquire().await;
        assert_eq!(pool.available(), Some(0));

        let blocked = tokio::time::timeout(Duration::from_millis(50), pool.acquire()).await;
        assert!(blocked.is_err());

        drop(first);
        let second = tokio::time::timeout(Duration::from_millis(500), pool.acquire()).await;
        assert!(second.is_ok());
    }

    #[test]
    fn test_zero_ceiling_is_raised_to_one() {
        assert_eq!(SurfacePool::new(Some(0)).max_surfaces(), Some(1));
    }
}
