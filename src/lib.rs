//! Trigger-and-execution engine for user scripts attached to clipboard entries.
//!
//! A script declares the host capabilities it wants, is matched against a
//! captured clipboard item, and runs inside a fresh Rhai engine that only
//! sees a snapshot of that item plus the capabilities it was granted.

pub mod core;
pub mod logging;
pub mod scripts;
