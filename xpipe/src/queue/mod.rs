//! Lock-free queues for cross-thread message transfer.
//!
//! This module provides the unidirectional queue a pipe is built from:
//! - Writer: producer end, stages items and publishes them in batches
//! - Reader: consumer end, sees only published items
//!
//! Exactly one thread may use each end. Items written since the last flush are
//! invisible to the reader; a flush makes the whole batch visible at once.

mod spsc;

pub use spsc::{channel, Reader, Writer};
