use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use meridian::{Directory, EdgeRead, GraphStorage, Storable};

#[derive(Parser)]
#[command(name = "meridian-inspect", about = "Inspect a stored graph directory")]
struct Cli {
    /// Graph directory to open
    #[arg(long, short)]
    dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print counts, capacities and bounds
    Stats {
        /// Emit JSON instead of the human-readable summary
        #[arg(long)]
        json: bool,
    },
    /// Print one node record
    Node { id: i32 },
    /// Walk the adjacency chain of a node
    Edges { node: i32 },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> meridian::Result<()> {
    let mut graph = GraphStorage::new(Directory::new(&cli.dir))?;
    if !graph.load_existing()? {
        return Err(meridian::GraphError::InvalidArgument(format!(
            "no graph found in {}",
            cli.dir.display()
        )));
    }

    match cli.command {
        Command::Stats { json } => {
            if json {
                let bounds = graph.bounds();
                let stats = serde_json::json!({
                    "nodes": graph.node_count(),
                    "edges": graph.edge_count(),
                    "names": graph.name_count(),
                    "capacity_bytes": graph.capacity(),
                    "bounds": {
                        "min_lat": bounds.min_lat,
                        "max_lat": bounds.max_lat,
                        "min_lon": bounds.min_lon,
                        "max_lon": bounds.max_lon,
                    },
                });
                println!("{stats:#}");
            } else {
                println!("{graph}");
            }
        }
        Command::Node { id } => {
            if id < 0 || id >= graph.node_count() {
                return Err(meridian::GraphError::InvalidArgument(format!(
                    "node {id} out of bounds [0,{})",
                    graph.node_count()
                )));
            }
            println!("node {id}: lat {}, lon {}", graph.latitude(id), graph.longitude(id));
        }
        Command::Edges { node } => {
            if node < 0 || node >= graph.node_count() {
                return Err(meridian::GraphError::InvalidArgument(format!(
                    "node {node} out of bounds [0,{})",
                    graph.node_count()
                )));
            }
            let mut iter = graph.get_edges(node);
            while iter.next()? {
                let name = graph.get_name(iter.name_ref())?;
                println!(
                    "edge {}: {} -> {}, {:.1} m, flags {:#x}, name {:?}, pillars {}",
                    iter.edge(),
                    iter.base_node(),
                    iter.node(),
                    iter.distance(),
                    iter.flags(),
                    name,
                    iter.way_geometry().size(),
                );
            }
        }
    }
    Ok(())
}
