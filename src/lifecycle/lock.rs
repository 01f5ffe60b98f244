//! The restart lock.
//!
//! # Responsibilities
//! - Guard the current service instance behind a single reader/writer lock
//! - Give request work a scoped read hold for its full duration
//! - Let the shutdown trigger drop the read hold of the task that invoked it
//! - Bound the wait for the write side
//!
//! # Design Decisions
//! - `tokio::sync::RwLock` is FIFO-fair: a queued writer blocks later readers,
//!   and readers already holding the lock finish before it is granted
//! - The service slot lives inside the lock, so it can only be read under a
//!   read hold and only be replaced under a write hold
//! - The "current task's read hold" is a task-local cell filled by `scope`

use std::cell::RefCell;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::lifecycle::error::LockError;
use crate::service::{ActiveService, PreprocessorSet, Service};

tokio::task_local! {
    static READ_HOLD: RefCell<Option<ReadHold>>;
}

/// The state guarded by the restart lock.
#[derive(Default)]
pub struct ServiceSlot {
    instance: Option<Arc<dyn Service>>,
    preprocessors: PreprocessorSet,
    generation: u64,
}

impl ServiceSlot {
    /// The live instance, if any.
    pub fn instance(&self) -> Option<&Arc<dyn Service>> {
        self.instance.as_ref()
    }

    /// Preprocessors registered by the live instance.
    pub fn preprocessors(&self) -> &PreprocessorSet {
        &self.preprocessors
    }

    /// Number of instances installed so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Snapshot of the live instance for a request.
    pub fn active(&self) -> Option<ActiveService> {
        self.instance.as_ref().map(|instance| ActiveService {
            instance: instance.clone(),
            preprocessors: self.preprocessors.clone(),
            generation: self.generation,
        })
    }

    pub(crate) fn install(&mut self, instance: Arc<dyn Service>, preprocessors: PreprocessorSet) -> u64 {
        self.generation += 1;
        self.instance = Some(instance);
        self.preprocessors = preprocessors;
        self.generation
    }

    pub(crate) fn take(&mut self) -> Option<Arc<dyn Service>> {
        self.preprocessors = PreprocessorSet::default();
        self.instance.take()
    }
}

/// A shared read hold on the restart lock.
pub struct ReadHold(OwnedRwLockReadGuard<ServiceSlot>);

impl Deref for ReadHold {
    type Target = ServiceSlot;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// An exclusive write hold on the restart lock. Dropping it releases the lock.
pub struct WriteHold(OwnedRwLockWriteGuard<ServiceSlot>);

impl Deref for WriteHold {
    type Target = ServiceSlot;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for WriteHold {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Reader/writer lock guarding "the service is actively serving".
#[derive(Clone, Default)]
pub struct RestartLock {
    inner: Arc<RwLock<ServiceSlot>>,
}

impl RestartLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for a read hold.
    pub async fn read(&self) -> ReadHold {
        ReadHold(self.inner.clone().read_owned().await)
    }

    /// Wait at most `timeout` for the write side.
    pub async fn write_timeout(&self, timeout: Duration) -> Result<WriteHold, LockError> {
        match tokio::time::timeout(timeout, self.inner.clone().write_owned()).await {
            Ok(guard) => Ok(WriteHold(guard)),
            Err(_) => Err(LockError::Timeout { waited: timeout }),
        }
    }

    /// Acquire a read hold and run `fut` with it registered as the current
    /// task's hold. The hold is released when `fut` finishes or is dropped.
    pub async fn scoped<F: Future>(&self, fut: F) -> F::Output {
        let hold = self.read().await;
        Self::scope(hold, fut).await
    }

    /// Run `fut` with `hold` registered as the current task's read hold.
    pub async fn scope<F: Future>(hold: ReadHold, fut: F) -> F::Output {
        READ_HOLD.scope(RefCell::new(Some(hold)), fut).await
    }

    /// Whether the current task owns a read hold.
    pub fn holds_read() -> bool {
        READ_HOLD
            .try_with(|cell| cell.borrow().is_some())
            .unwrap_or(false)
    }

    /// Release the current task's read hold.
    ///
    /// Fails with [`LockError::NotHeld`] outside a `scope`, or when the hold
    /// was already released.
    pub fn release_current_read() -> Result<(), LockError> {
        let hold = READ_HOLD
            .try_with(|cell| cell.borrow_mut().take())
            .map_err(|_| LockError::NotHeld)?;

        match hold {
            Some(hold) => {
                drop(hold);
                Ok(())
            }
            None => Err(LockError::NotHeld),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[test]
    fn test_release_outside_scope_is_not_held() {
        assert_eq!(RestartLock::release_current_read(), Err(LockError::NotHeld));
        assert!(!RestartLock::holds_read());
    }

    #[tokio::test]
    async fn test_release_inside_scope_only_once() {
        let lock = RestartLock::new();
        lock.scoped(async {
            assert!(RestartLock::holds_read());
            assert_eq!(RestartLock::release_current_read(), Ok(()));
            assert!(!RestartLock::holds_read());
            assert_eq!(RestartLock::release_current_read(), Err(LockError::NotHeld));
        })
        .await;
    }

    #[tokio::test]
    async fn test_released_hold_lets_writer_in() {
        let lock = RestartLock::new();
        let writer = lock.clone();
        lock.scoped(async move {
            RestartLock::release_current_read().unwrap();
            let hold = writer.write_timeout(Duration::from_millis(200)).await;
            assert!(hold.is_ok());
        })
        .await;
    }

    #[tokio::test]
    async fn test_write_timeout_while_reader_held() {
        let lock = RestartLock::new();
        let _reader = lock.read().await;

        let err = lock.write_timeout(Duration::from_millis(50)).await.err();
        assert_eq!(err, Some(LockError::Timeout { waited: Duration::from_millis(50) }));

        // The abandoned writer must not block further readers.
        let again = tokio::time::timeout(Duration::from_millis(200), lock.read()).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_queued_writer_blocks_new_readers() {
        let lock = RestartLock::new();
        let first = lock.read().await;

        let writer_lock = lock.clone();
        let writer = tokio::spawn(async move {
            let _hold = writer_lock.write_timeout(Duration::from_secs(5)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let late = tokio::time::timeout(Duration::from_millis(50), lock.read()).await;
        assert!(late.is_err(), "reader must queue behind a waiting writer");

        drop(first);
        writer.await.unwrap();
        assert!(tokio::time::timeout(Duration::from_millis(200), lock.read()).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_and_writer_never_overlap() {
        let lock = RestartLock::new();
        let readers = Arc::new(AtomicUsize::new(0));
        let overlap = Arc::new(AtomicBool::new(false));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let lock = lock.clone();
            let readers = readers.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..20 {
                    let readers = readers.clone();
                    lock.scoped(async move {
                        readers.fetch_add(1, Ordering::SeqCst);
                        tokio::task::yield_now().await;
                        readers.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await;
                }
            }));
        }
        for _ in 0..10 {
            let _hold = lock.write_timeout(Duration::from_secs(5)).await.unwrap();
            if readers.load(Ordering::SeqCst) != 0 {
                overlap.store(true, Ordering::SeqCst);
            }
            tokio::task::yield_now().await;
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert!(!overlap.load(Ordering::SeqCst));
    }
}
