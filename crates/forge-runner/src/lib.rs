//! Job execution: isolated workspaces, sequential steps, artifact handoff.

pub mod executor;
pub mod shell;

pub use executor::JobExecutor;
pub use shell::{CommandOutput, OutputLine, OutputStream, run_command};
