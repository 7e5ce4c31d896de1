use anyhow::Result;
use clap::{Parser, Subcommand};
use railnet::{build_network, load_config, station_matrix, NetworkInput};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "railnet")]
#[command(about = "Track graph distances between rail stations", long_about = None)]
struct Cli {
    /// Network config (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the graph and print its statistics
    Stats {
        /// Network file (JSON)
        network: PathBuf,
    },
    /// Distance between two stations
    Distance {
        /// Network file (JSON)
        network: PathBuf,
        /// Station id
        #[arg(long)]
        from: String,
        /// Station id
        #[arg(long)]
        to: String,
    },
    /// Distance for every pair of stations
    Matrix {
        /// Network file (JSON)
        network: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Stats { network } => {
            let input = NetworkInput::load(&network)?;
            let start = Instant::now();
            let rail = build_network(config, &input).await?;

            println!("State: {}", rail.state());
            if let Some(stats) = rail.build_stats() {
                println!("Segments: {} ({} skipped)", stats.segments, stats.skipped_segments);
                println!("Nodes: {}", stats.nodes);
                println!("Edges: {}", stats.edges);
                println!("Track length: {:.1}", stats.total_length);
            }
            println!("Stations: {}", input.stations.len());
            println!("Scaling factor: {:.6}", rail.scaling_factor());
            println!("Build took {:.3}s", start.elapsed().as_secs_f64());
        }
        Commands::Distance { network, from, to } => {
            let input = NetworkInput::load(&network)?;
            let from = input.station(&from)?;
            let to = input.station(&to)?;
            let rail = build_network(config, &input).await?;

            match rail.distance_between(from, to) {
                Ok(distance) => println!("{} -> {}: {:.2}", from.id, to.id, distance),
                Err(err) => {
                    let fallback = from.straight_line_distance(to);
                    println!("{} -> {}: {:.2} (straight line, {})", from.id, to.id, fallback, err);
                }
            }
        }
        Commands::Matrix { network } => {
            let input = NetworkInput::load(&network)?;
            let rail = build_network(config, &input).await?;

            println!("from\tto\tdistance\tstraight_line");
            for row in station_matrix(&rail, &input.stations) {
                println!(
                    "{}\t{}\t{:.2}\t{:.2}",
                    row.from, row.to, row.distance, row.straight_line
                );
            }
        }
    }

    Ok(())
}
