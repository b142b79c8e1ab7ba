use std::path::PathBuf;

use clap::Parser;
use log::{info, warn};
use swarm::config::Properties;
use swarm::handlers::HandlerRegistry;
use swarm::orchestrator::Swarm;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the properties file
    #[arg(short = 'c', long, default_value = "swarm.json")]
    config: PathBuf,

    /// Write logs to a timestamped file in this directory instead of stderr
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    swarm::logging::init(args.log_dir.as_deref())?;

    let properties = Properties::load(&args.config)?;
    let routes = properties.read_proxy_list()?;
    if routes.is_empty() {
        warn!(
            "Proxy list {} is empty, no agents to start",
            properties.proxy_list_path.display()
        );
    }

    info!("Starting swarm against {}", properties.server_address);

    let mut swarm = Swarm::new(properties.swarm_settings(), HandlerRegistry::standard());
    swarm.initialize_agents(&routes);
    swarm.run().await;

    info!("Swarm went quiet, shutting down");
    Ok(())
}
