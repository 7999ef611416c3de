//! Byte budget shared by every staged file.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

use crate::error::{AppError, Result};

/// Counter of bytes currently staged, bounded by `max_space`.
///
/// Invariant: `0 <= loaded < max_space` after every successful reservation.
#[derive(Debug)]
pub struct SpaceLedger {
    max_space: u64,
    loaded: AtomicU64,
    released: Notify,
}

impl SpaceLedger {
    pub fn new(max_space: u64) -> Self {
        Self {
            max_space,
            loaded: AtomicU64::new(0),
            released: Notify::new(),
        }
    }

    pub fn max_space(&self) -> u64 {
        self.max_space
    }

    /// Bytes currently reserved.
    pub fn loaded(&self) -> u64 {
        self.loaded.load(Ordering::Acquire)
    }

    /// Reserve `size` bytes if the budget allows it right now.
    ///
    /// Fails with `FileTooLarge` when `size` alone can never fit.
    pub fn try_reserve(&self, size: u64) -> Result<bool> {
        self.check_fits(size)?;
        Ok(self.reserve_now(size))
    }

    /// Reserve `size` bytes, waiting up to `wait` for other files to be freed.
    pub async fn reserve(&self, size: u64, wait: Duration) -> Result<()> {
        self.check_fits(size)?;
        let wait_for_space = async {
            loop {
                // Register interest before checking so a release between the
                // check and the await is not lost.
                let released = self.released.notified();
                tokio::pin!(released);
                released.as_mut().enable();

                if self.reserve_now(size) {
                    return;
                }
                released.await;
            }
        };

        tokio::time::timeout(wait, wait_for_space)
            .await
            .map_err(|_| AppError::QuotaExhausted { size })
    }

    /// Return `size` previously reserved bytes to the budget.
    pub fn release(&self, size: u64) {
        let previous = self
            .loaded
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |loaded| {
                Some(loaded.saturating_sub(size))
            })
            .unwrap_or_default();
        if previous < size {
            log::error!(
                "Staging ledger released {} bytes with only {} reserved",
                size,
                previous
            );
        }
        self.released.notify_waiters();
    }

    fn reserve_now(&self, size: u64) -> bool {
        let max_space = self.max_space;
        self.loaded
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |loaded| {
                loaded.checked_add(size).filter(|&next| next < max_space)
            })
            .is_ok()
    }

    fn check_fits(&self, size: u64) -> Result<()> {
        if size >= self.max_space {
            return Err(AppError::FileTooLarge {
                size,
                max: self.max_space,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_reserve_below_budget() {
        let ledger = SpaceLedger::new(100);
        assert!(ledger.try_reserve(40).unwrap());
        assert!(ledger.try_reserve(59).unwrap());
        assert_eq!(ledger.loaded(), 99);
        // 99 + 1 == max is not strictly below the budget
        assert!(!ledger.try_reserve(1).unwrap());
        assert_eq!(ledger.loaded(), 99);
    }

    #[test]
    fn test_too_large_never_reserves() {
        let ledger = SpaceLedger::new(100);
        assert!(matches!(
            ledger.try_reserve(100),
            Err(AppError::FileTooLarge { size: 100, max: 100 })
        ));
        assert!(matches!(
            ledger.try_reserve(u64::MAX),
            Err(AppError::FileTooLarge { .. })
        ));
        assert_eq!(ledger.loaded(), 0);
    }

    #[test]
    fn test_release_restores_budget() {
        let ledger = SpaceLedger::new(100);
        assert!(ledger.try_reserve(90).unwrap());
        ledger.release(90);
        assert_eq!(ledger.loaded(), 0);
        assert!(ledger.try_reserve(90).unwrap());
    }

    #[tokio::test]
    async fn test_reserve_times_out_without_touching_ledger() {
        let ledger = SpaceLedger::new(100);
        assert!(ledger.try_reserve(80).unwrap());

        let result = ledger.reserve(30, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(AppError::QuotaExhausted { size: 30 })));
        assert_eq!(ledger.loaded(), 80);
    }

    #[tokio::test]
    async fn test_reserve_wakes_on_release() {
        let ledger = Arc::new(SpaceLedger::new(100));
        assert!(ledger.try_reserve(80).unwrap());

        let waiter = {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move { ledger.reserve(50, Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        ledger.release(80);

        waiter.await.unwrap().unwrap();
        assert_eq!(ledger.loaded(), 50);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reservations_stay_within_budget() {
        let ledger = Arc::new(SpaceLedger::new(1_000));
        let mut tasks = Vec::new();

        for i in 0..64u64 {
            let ledger = Arc::clone(&ledger);
            tasks.push(tokio::spawn(async move {
                let size = 50 + (i % 7) * 20;
                ledger.reserve(size, Duration::from_secs(10)).await.unwrap();
                let loaded = ledger.loaded();
                assert!(loaded < ledger.max_space(), "loaded {loaded}");
                tokio::task::yield_now().await;
                ledger.release(size);
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(ledger.loaded(), 0);
    }
}
