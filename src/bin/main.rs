use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tether::config::{SettingsOverrides, SimulationSettings, merge_settings};
use tether::simulation;

/// Cancels backend work when the client connection that requested it goes away
#[derive(Parser)]
#[command(name = "tether")]
#[command(version)]
#[command(about = "Cancels backend work when the client connection that requested it goes away")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open connections, dispatch operations on a local node, then disconnect
    Simulate {
        /// TOML file with simulation settings
        #[arg(long)]
        config: Option<PathBuf>,

        /// Node ID used in task IDs
        #[arg(long)]
        node_id: Option<String>,

        /// Number of client connections
        #[arg(long)]
        connections: Option<usize>,

        /// Operations dispatched per connection
        #[arg(long)]
        operations: Option<usize>,

        /// Duration of each operation in milliseconds
        #[arg(long)]
        duration_ms: Option<u64>,

        /// Close connections this many milliseconds after dispatching
        #[arg(long)]
        close_after_ms: Option<u64>,

        /// Tokio worker threads
        #[arg(long)]
        worker_threads: Option<usize>,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            config,
            node_id,
            connections,
            operations,
            duration_ms,
            close_after_ms,
            worker_threads,
        } => {
            let base = match config {
                Some(path) => SimulationSettings::load(&path).unwrap_or_else(|e| {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }),
                None => SimulationSettings::default(),
            };
            let settings = merge_settings(
                base,
                SettingsOverrides {
                    node_id,
                    connections,
                    operations_per_connection: operations,
                    operation_duration_ms: duration_ms,
                    close_after_ms,
                    worker_threads,
                },
            );
            if let Err(e) = settings.validate() {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(settings.worker_threads)
                .enable_all()
                .build()
                .unwrap_or_else(|e| {
                    eprintln!("Error: failed to start runtime: {}", e);
                    std::process::exit(1);
                });

            match runtime.block_on(simulation::run(&settings)) {
                Ok(report) => match serde_json::to_string_pretty(&report) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        std::process::exit(1);
                    }
                },
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}
