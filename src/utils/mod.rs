//! Utility functions and helpers
//!
//! This module contains the crash-safe file write helpers used by the
//! JSON file storage backend.

pub mod atomic;

pub use atomic::{atomic_write_with, cleanup_temp_file, AtomicError, AtomicResult};
