//! House Price Model Server
//!
//! Serves house price predictions from a tabular tree ensemble and an image
//! regressor over HTTP.

use core::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::{Config, LoadPolicy};
use house_price_server::commands;
use tracing_subscriber::EnvFilter;

/// House Price Model Server
#[derive(Parser)]
#[command(name = "house-price-server")]
#[command(about = "Serves house price predictions from tabular and image models")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the models and serve predictions over HTTP
    Serve {
        /// Address to bind (overrides `BIND_ADDR`)
        #[arg(short, long)]
        bind: Option<SocketAddr>,

        /// Start even if some models fail to load
        #[arg(long)]
        degraded: bool,
    },

    /// Load the models and report their schemas
    Inspect,

    /// Run a single prediction without starting the server
    Predict {
        /// Registered model name
        #[arg(short, long)]
        model: String,

        /// Input field as `name=value`; repeat for every field
        #[arg(short, long = "field")]
        fields: Vec<String>,

        /// Image file for image models
        #[arg(short, long)]
        image: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber, RUST_LOG wins when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = Config::from_env()?;

    match cli.command {
        Commands::Serve { bind, degraded } => {
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            if degraded {
                config.load_policy = LoadPolicy::Degraded;
            }
            commands::serve::run(&config).await?;
        }
        Commands::Inspect => {
            commands::inspect::run(&config).await?;
        }
        Commands::Predict {
            model,
            fields,
            image,
        } => {
            commands::predict::run(&config, &model, &fields, image.as_deref()).await?;
        }
    }

    Ok(())
}
