//! Side effects: config file, child processes, model server, operator console,
//! source retrieval, prompt rendering, sandbox execution and run artifacts.

pub mod artifacts;
pub mod config;
pub mod llm;
pub mod operator;
pub mod process;
pub mod prompt;
pub mod sandbox;
pub mod sources;
