//! Deterministic, pure logic shared by the coordinator and the sandbox.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod classifier;
pub mod clean;
pub mod diagnose;
pub mod extract;
pub mod feedback;
pub mod types;
