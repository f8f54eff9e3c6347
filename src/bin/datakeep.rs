use clap::{Parser, Subcommand};
use datakeep::DatabaseConfig;
use tracing::Level;

mod commands;

use commands::config::ConfigArgs;
use commands::init::InitArgs;
use commands::status::StatusArgs;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// configuration file path, by default $HOME/.datakeep/datakeep.toml is used
    #[clap(short, long)]
    config: Option<String>,

    /// Print debug information
    #[clap(long)]
    debug: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the tables defined in a schema file, skipping existing ones
    Init(InitArgs),

    /// Show schema and connection pool status
    Status(StatusArgs),

    /// Show the resolved configuration
    Config(ConfigArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.debug {
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = match DatabaseConfig::new(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Init(args) => commands::init::run(&config, args).await,
        Commands::Status(args) => commands::status::run(&config, args).await,
        Commands::Config(args) => commands::config::run(&config, &cli.config, args),
    };

    if let Err(e) = result {
        eprintln!("ERROR: {}", e);
        std::process::exit(1);
    }
}
