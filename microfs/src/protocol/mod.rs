//! Protocol implementations.

pub mod literal;
pub mod raw_repl;

// Re-export common types
pub use raw_repl::{ExecOutput, RawRepl, RawReplConfig, ReplMode, control};
