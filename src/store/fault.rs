//! FaultPlan - injected failures for crash testing.

use parking_lot::Mutex;

use crate::error::StorageError;

/// Arms a one-shot failure of the storage medium.
///
/// `fail_after(n)` lets the next `n` applied operations succeed and fails the
/// one after, as if the process died mid-write. Counting spans commits, so a
/// run of single-operation commits can be cut off part way too.
#[derive(Debug, Default)]
pub struct FaultPlan {
    remaining: Mutex<Option<usize>>,
}

impl FaultPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_after(&self, operations: usize) {
        *self.remaining.lock() = Some(operations);
    }

    pub fn disarm(&self) {
        *self.remaining.lock() = None;
    }

    pub fn is_armed(&self) -> bool {
        self.remaining.lock().is_some()
    }

    /// Called once per operation about to be applied.
    pub(crate) fn check(&self) -> Result<(), StorageError> {
        let mut remaining = self.remaining.lock();
        match *remaining {
            Some(0) => {
                *remaining = None;
                Err(StorageError::Io("injected write failure".into()))
            }
            Some(n) => {
                *remaining = Some(n - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }
}
