//! Forge CD CLI entrypoint.

use clap::Parser;

mod commands;
mod handlers;

use commands::Commands;

#[derive(Parser)]
#[command(name = "forge")]
#[command(author, version, about = "Forge CD command-line interface", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { path } => handlers::validate(path.as_deref())?,
        Commands::Run {
            pipeline,
            git_ref,
            event,
            workspace,
        } => {
            let succeeded =
                handlers::run_pipeline(pipeline.as_deref(), &git_ref, &event, workspace.as_deref())
                    .await?;
            if !succeeded {
                std::process::exit(1);
            }
        }
        Commands::Schema => handlers::schema()?,
    }

    Ok(())
}
