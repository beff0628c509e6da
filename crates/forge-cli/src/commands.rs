//! CLI command definitions.

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a pipeline definition without running it
    Validate {
        /// Path to pipeline file (searched for if omitted)
        path: Option<String>,
    },

    /// Execute a pipeline run
    Run {
        /// Path to pipeline file (searched for if omitted)
        pipeline: Option<String>,

        /// Git ref the run is for, e.g. refs/heads/main
        #[arg(long = "ref", default_value = "refs/heads/main")]
        git_ref: String,

        /// Triggering event: push, pull_request or schedule
        #[arg(long, default_value = "push")]
        event: String,

        /// Directory for job workspaces and stored artifacts
        #[arg(long)]
        workspace: Option<String>,
    },

    /// Print the JSON schema for pipeline files
    Schema,
}
