mod cmd;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;

#[derive(Parser)]
#[command(
    name = "aquariumd",
    about = "Aquarium feeder and UV lamp controller",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to the YAML config file
    #[arg(long, global = true, env = "AQUARIUM_CONFIG", default_value = "aquarium.yaml")]
    config: PathBuf,

    /// Override the store path from the config
    #[arg(long, global = true, env = "AQUARIUM_STORE")]
    store: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API, tick scheduler and device transport
    Serve {
        /// Port to listen on (overrides server.port)
        #[arg(long, env = "AQUARIUM_PORT")]
        port: Option<u16>,

        /// Transport mode: simulated or mqtt (overrides transport.mode)
        #[arg(long, env = "AQUARIUM_TRANSPORT")]
        transport: Option<String>,
    },

    /// Inspect and initialize the config file
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// List recorded device actions, newest first
    History {
        /// Filter by device: FEEDER or UV
        #[arg(long)]
        device: Option<String>,
        /// Filter by trigger: MANUAL or SCHEDULE
        #[arg(long)]
        source: Option<String>,
        /// Filter by status
        #[arg(long)]
        status: Option<String>,
        /// Maximum number of rows
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Show mirrored device status and stock
    Status,

    /// Insert demo schedules and stock (skipped when schedules exist)
    Seed {
        /// Remove closed actions and all schedules, and set stock to 0
        #[arg(long)]
        clear: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let store = cli.store.as_ref();
    let result = match cli.command {
        Commands::Serve { port, transport } => {
            cmd::serve::run(&cli.config, store, port, transport.as_deref())
        }
        Commands::Config { subcommand } => cmd::config::run(&cli.config, subcommand, cli.json),
        Commands::History {
            device,
            source,
            status,
            limit,
        } => cmd::history::run(
            &cli.config,
            store,
            cmd::history::Filters {
                device,
                source,
                status,
                limit,
            },
            cli.json,
        ),
        Commands::Status => cmd::status::run(&cli.config, store, cli.json),
        Commands::Seed { clear } => cmd::seed::run(&cli.config, store, clear, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
