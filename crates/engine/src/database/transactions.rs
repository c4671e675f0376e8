//! Closure-style transactions and retry configuration
//!
//! `Database::transaction` wraps `begin_transaction`/`end_transaction`
//! around a closure. `transaction_with_retry` also retries a contended
//! begin, which is the one place `Busy` can come from.

use std::time::Duration;

use docstore_core::Result;
use tracing::{debug, warn};

use super::Database;

// ============================================================================
// Retry Configuration
// ============================================================================

/// Configuration for retrying a contended transaction begin
///
/// # Example
/// ```ignore
/// let config = RetryConfig::new().with_max_retries(5).with_max_delay_ms(200);
/// db.transaction_with_retry(config, |db| db.raw_put("meta", b"k", b"", b"v"))?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries)
    pub max_retries: usize,
    /// Base delay between retries in milliseconds (exponential backoff)
    pub base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 10,
            max_delay_ms: 100,
        }
    }
}

impl RetryConfig {
    /// Create a new RetryConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a RetryConfig with no retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Set maximum number of retries
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set base delay for exponential backoff
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Set maximum delay between retries
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Calculate delay for a given attempt (exponential backoff)
    pub(crate) fn calculate_delay(&self, attempt: usize) -> Duration {
        // 1 << 63 is the largest shift that fits a u64
        let shift = attempt.min(63);
        let multiplier = 1u64 << shift;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

// ============================================================================
// Closure API
// ============================================================================

impl Database {
    /// Run `f` inside a transaction
    ///
    /// Commits if `f` returns `Ok`, rolls back if it returns `Err`, and
    /// returns `f`'s result. Called inside an open transaction it nests,
    /// and the outermost transaction decides.
    ///
    /// # Example
    /// ```ignore
    /// let doc = db.transaction(|db| db.put_document(&PutRequest::new("doc-1").body("{}")))?;
    /// ```
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T>,
    {
        self.begin_transaction()?;
        self.finish_transaction(f(self))
    }

    /// Like `transaction`, but a `Busy` begin is retried with exponential
    /// backoff up to `retry.max_retries` times
    ///
    /// # Errors
    ///
    /// The last `Busy` once retries are exhausted; any other error as
    /// `transaction` returns it.
    pub fn transaction_with_retry<T, F>(&self, retry: RetryConfig, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            match self.begin_transaction() {
                Ok(()) => break,
                Err(e) if e.is_transient() && attempt < retry.max_retries => {
                    let delay = retry.calculate_delay(attempt);
                    debug!(
                        target: "docstore::txn",
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Transaction busy, retrying"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
        self.finish_transaction(f(self))
    }

    fn finish_transaction<T>(&self, outcome: Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => {
                self.end_transaction(true)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(end_err) = self.end_transaction(false) {
                    warn!(target: "docstore::txn", error = %end_err, "Rollback failed");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseConfig;
    use docstore_concurrency::WaitPolicy;
    use docstore_core::{Error, ErrorCode};
    use std::sync::Barrier;
    use tempfile::TempDir;

    #[test]
    fn test_exponential_backoff_is_capped() {
        let config = RetryConfig::new()
            .with_base_delay_ms(10)
            .with_max_delay_ms(50);
        assert_eq!(config.calculate_delay(0), Duration::from_millis(10));
        assert_eq!(config.calculate_delay(1), Duration::from_millis(20));
        assert_eq!(config.calculate_delay(2), Duration::from_millis(40));
        assert_eq!(config.calculate_delay(3), Duration::from_millis(50));
        assert_eq!(config.calculate_delay(200), Duration::from_millis(50));
    }

    #[test]
    fn test_no_retry() {
        assert_eq!(RetryConfig::no_retry().max_retries, 0);
    }

    #[test]
    fn test_closure_commits_on_ok() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path().join("db"), &DatabaseConfig::default()).unwrap();

        let value = db
            .transaction(|db| {
                assert!(db.is_in_transaction());
                db.raw_put("meta", b"k", b"", b"v")?;
                Ok(7)
            })
            .unwrap();
        assert_eq!(value, 7);
        assert!(!db.is_in_transaction());
        assert_eq!(db.raw_get("meta", b"k").unwrap().body, "v");
    }

    #[test]
    fn test_closure_rolls_back_on_err() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path().join("db"), &DatabaseConfig::default()).unwrap();

        let err = db
            .transaction(|db| -> Result<()> {
                db.raw_put("meta", b"k", b"", b"v")?;
                Err(Error::engine(ErrorCode::Conflict))
            })
            .unwrap_err();
        assert!(err.is(ErrorCode::Conflict));
        assert!(!db.is_in_transaction());
        assert!(db.raw_get("meta", b"k").unwrap_err().is(ErrorCode::NotFound));
    }

    #[test]
    fn test_retry_waits_out_a_short_transaction() {
        let dir = TempDir::new().unwrap();
        let config = DatabaseConfig::default().wait_policy(WaitPolicy::NoWait);
        let db = Database::open(dir.path().join("db"), &config).unwrap();
        let started = Barrier::new(2);

        std::thread::scope(|s| {
            s.spawn(|| {
                db.begin_transaction().unwrap();
                started.wait();
                std::thread::sleep(Duration::from_millis(30));
                db.end_transaction(true).unwrap();
            });
            started.wait();
            let retry = RetryConfig::new()
                .with_max_retries(20)
                .with_base_delay_ms(5)
                .with_max_delay_ms(20);
            db.transaction_with_retry(retry, |db| db.raw_put("meta", b"k", b"", b"v"))
                .unwrap();
        });
        assert!(db.transaction_metrics().total_busy >= 1);
        assert_eq!(db.raw_get("meta", b"k").unwrap().body, "v");
    }

    #[test]
    fn test_retry_gives_up() {
        let dir = TempDir::new().unwrap();
        let config = DatabaseConfig::default().wait_policy(WaitPolicy::NoWait);
        let db = Database::open(dir.path().join("db"), &config).unwrap();
        db.begin_transaction().unwrap();

        std::thread::scope(|s| {
            let err = s
                .spawn(|| {
                    let retry = RetryConfig::new().with_max_retries(2).with_base_delay_ms(1);
                    db.transaction_with_retry(retry, |_| Ok(())).unwrap_err()
                })
                .join()
                .unwrap();
            assert!(err.is(ErrorCode::Busy));
        });
        db.end_transaction(false).unwrap();
        assert_eq!(db.transaction_metrics().total_busy, 3);
    }
}
