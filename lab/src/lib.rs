//! Multi-agent research and code lab.
//!
//! A coordinator drives six model-backed roles (browsing, research, code
//! writing, code execution, code review, critique) through bounded rounds that
//! produce a research report and a program for one topic. Generated code only
//! runs after the operator confirms it. The architecture keeps a strict split:
//!
//! - **[`core`]**: Pure, deterministic logic (code extraction, failure
//!   classification, feedback folding). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (model server, sandbox processes,
//!   source collection, operator prompts, artifacts). Each sits behind a trait
//!   so tests can substitute scripted doubles.
//!
//! [`agents`] turn one role operation into a prompt plus a model call,
//! [`coordinator`] owns the round state machine and [`driver`] re-invokes it
//! until the run is finalized.

pub mod agents;
pub mod coordinator;
pub mod core;
pub mod driver;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
