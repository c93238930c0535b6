//! Utility functions for string formatting.

pub mod format;

pub use format::truncate_body;
