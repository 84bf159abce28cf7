use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{ConnectionArgs, Verbosity};

#[derive(Parser, Debug)]
#[command(name = "consul-migrate")]
#[command(about = "Migrate Consul ACL policies, roles, tokens and namespaces between clusters")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Export Consul data
    Export {
        /// File to write the data to ("-" or omitted for stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        connection: ConnectionArgs,

        #[command(flatten)]
        verbosity: Verbosity,
    },

    /// Import Consul data from the output of `consul-migrate export`
    Import {
        /// File to read the data from ("-" or omitted for stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        #[command(flatten)]
        connection: ConnectionArgs,

        #[command(flatten)]
        verbosity: Verbosity,
    },
}

/// Log to stderr so an exported snapshot on stdout stays parseable
fn init_logging(verbosity: &Verbosity) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(verbosity.level()));

    let json = verbosity.log_json;
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Export {
            output,
            connection,
            verbosity,
        } => {
            init_logging(&verbosity);
            commands::run_export(&connection, output).await?;
        }
        Commands::Import {
            input,
            connection,
            verbosity,
        } => {
            init_logging(&verbosity);
            commands::run_import(&connection, input).await?;
        }
    }

    Ok(())
}
