//! Fixtures and assertion macros for store tests.
//!
//! Feature-gated behind `testutil`:
//!
//! ```toml
//! [dev-dependencies]
//! ticket-registry-storage = { path = "../storage", features = ["testutil"] }
//! ```

use crate::{clock::ManualClock, memory::MemoryBackend};

/// Key `"{prefix}:{idx:06}"`. Zero-padding keeps byte order equal to
/// numeric order.
#[must_use]
pub fn make_key(prefix: &str, idx: usize) -> Vec<u8> {
    format!("{prefix}:{idx:06}").into_bytes()
}

/// Value `"task{task}-val{seq}"`, so a racing test can tell which writer won.
#[must_use]
pub fn make_tagged_value(task: usize, seq: usize) -> Vec<u8> {
    format!("task{task}-val{seq}").into_bytes()
}

/// A [`MemoryBackend`] whose store clock is a [`ManualClock`] at the Unix
/// epoch. The returned clock is shared with the backend.
#[must_use]
pub fn manual_backend() -> (MemoryBackend, ManualClock) {
    let clock = ManualClock::default();
    (MemoryBackend::with_clock(clock.clone()), clock)
}

/// Assert that a `StorageResult` is `Err(StorageError::Conflict)`.
///
/// Bind the result first when the expression consumes a transaction.
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use ticket_registry_storage::{StorageError, StorageResult, assert_conflict};
///
/// let result: StorageResult<()> = Err(StorageError::Conflict);
/// assert_conflict!(result);
/// ```
#[macro_export]
macro_rules! assert_conflict {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::StorageError::Conflict)),
            "expected StorageError::Conflict, got: {:?}",
            $result,
        );
    };
    ($result:expr, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::StorageError::Conflict)),
            "{}: expected StorageError::Conflict, got: {:?}",
            $msg,
            $result,
        );
    };
}

/// Unwrap a `StorageResult`, panicking with the storage error otherwise.
#[macro_export]
macro_rules! assert_storage_ok {
    ($result:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("expected Ok, got StorageError: {e:?}"),
        }
    };
    ($result:expr, $msg:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("{}: expected Ok, got StorageError: {e:?}", $msg),
        }
    };
}
