//! Integration tests for the record store, cursors and backend facade.

mod properties;
mod concurrency;
#[cfg(feature = "emitter")]
mod signals;
