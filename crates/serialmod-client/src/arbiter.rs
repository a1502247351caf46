//! Exclusive, first-come-first-served access to one serial line.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, MutexGuard};
use tracing::trace;

/// Owns a channel and hands it out to one caller at a time.
///
/// Waiters are served in the order they called [`LineArbiter::acquire`].
/// Dropping a pending `acquire` future leaves the queue without side effects.
#[derive(Debug)]
pub struct LineArbiter<C> {
    line: Mutex<C>,
    next_grant: AtomicU64,
}

impl<C> LineArbiter<C> {
    pub fn new(channel: C) -> Self {
        Self {
            line: Mutex::new(channel),
            next_grant: AtomicU64::new(1),
        }
    }

    /// Waits for the line. The grant holds it until dropped.
    pub async fn acquire(&self) -> LineGrant<'_, C> {
        let guard = self.line.lock().await;
        self.grant(guard)
    }

    /// Takes the line if it is free right now.
    pub fn try_acquire(&self) -> Option<LineGrant<'_, C>> {
        self.line.try_lock().ok().map(|guard| self.grant(guard))
    }

    pub fn into_inner(self) -> C {
        self.line.into_inner()
    }

    fn grant<'a>(&'a self, guard: MutexGuard<'a, C>) -> LineGrant<'a, C> {
        let id = self.next_grant.fetch_add(1, Ordering::Relaxed);
        trace!(grant = id, "line acquired");
        LineGrant { id, guard }
    }
}

/// Exclusive access to the line for one transaction.
#[derive(Debug)]
pub struct LineGrant<'a, C> {
    id: u64,
    guard: MutexGuard<'a, C>,
}

impl<C> LineGrant<'_, C> {
    /// Grants are numbered in the order they were handed out.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl<C> Deref for LineGrant<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.guard
    }
}

impl<C> DerefMut for LineGrant<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.guard
    }
}

impl<C> Drop for LineGrant<'_, C> {
    fn drop(&mut self) {
        trace!(grant = self.id, "line released");
    }
}

#[cfg(test)]
mod tests {
    use super::LineArbiter;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex;

    #[tokio::test(start_paused = true)]
    async fn serves_waiters_in_arrival_order() {
        let arbiter = Arc::new(LineArbiter::new(Vec::<u32>::new()));
        let first = arbiter.acquire().await;

        let mut tasks = Vec::new();
        for caller in 0..5u32 {
            let arbiter = Arc::clone(&arbiter);
            tasks.push(tokio::spawn(async move {
                let mut grant = arbiter.acquire().await;
                grant.push(caller);
            }));
            // Let the task reach the wait queue before spawning the next one.
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        drop(first);
        for task in tasks {
            task.await.unwrap();
        }
        let arbiter = Arc::into_inner(arbiter).unwrap();
        assert_eq!(arbiter.into_inner(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn try_acquire_fails_while_held() {
        let arbiter = LineArbiter::new(0u8);
        let grant = arbiter.try_acquire().unwrap();
        assert!(arbiter.try_acquire().is_none());
        drop(grant);
        assert!(arbiter.try_acquire().is_some());
    }

    #[tokio::test]
    async fn grant_ids_increase() {
        let arbiter = LineArbiter::new(());
        let first = arbiter.acquire().await.id();
        let second = arbiter.acquire().await.id();
        assert!(second > first);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_waiter_does_not_block_the_queue() {
        let arbiter = Arc::new(LineArbiter::new(0u32));
        let log = Arc::new(Mutex::new(Vec::new()));
        let held = arbiter.acquire().await;

        let abandoned = {
            let arbiter = Arc::clone(&arbiter);
            tokio::spawn(async move {
                let _grant = arbiter.acquire().await;
            })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;

        let patient = {
            let arbiter = Arc::clone(&arbiter);
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                let mut grant = arbiter.acquire().await;
                *grant += 1;
                log.lock().await.push("patient");
            })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;

        abandoned.abort();
        assert!(abandoned.await.unwrap_err().is_cancelled());
        drop(held);
        patient.await.unwrap();

        assert_eq!(*log.lock().await, vec!["patient"]);
        assert_eq!(*arbiter.acquire().await, 1);
    }
}
