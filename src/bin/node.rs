//! starmesh node binary

use clap::{Parser, Subcommand};
use starmesh::{Config, Node};
use std::net::IpAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "starmesh-node")]
#[command(about = "Self-organizing overlay network node", long_about = None)]
#[command(version = starmesh::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a node (joins an existing star or founds a new one)
    Serve {
        /// Intra-star port (UDP + HTTP)
        #[arg(long)]
        star_port: Option<u16>,

        /// Inter-star port (UDP + HTTP)
        #[arg(long)]
        galaxy_port: Option<u16>,

        /// Group identifier
        #[arg(long)]
        group: Option<String>,

        /// Member capacity of a star founded by this node
        #[arg(long)]
        max_members: Option<usize>,

        /// Local address override (auto-detected when omitted)
        #[arg(long)]
        bind_ip: Option<IpAddr>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut config = Config::load();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("starmesh={}", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve {
            star_port,
            galaxy_port,
            group,
            max_members,
            bind_ip,
        } => {
            if let Some(p) = star_port {
                config.node.star_port = p;
            }
            if let Some(p) = galaxy_port {
                config.node.galaxy_port = p;
            }
            if let Some(g) = group {
                config.node.group_id = g;
            }
            if let Some(m) = max_members {
                config.node.max_members = m;
            }
            if let Some(ip) = bind_ip {
                config.node.bind_ip = Some(ip);
            }
            Node::new(config)?.serve().await?;
        }
    }
    Ok(())
}
