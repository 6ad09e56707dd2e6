//! gatewayd — FinLLM authorization gateway.

use clap::{Parser, Subcommand};
use gatewayd::{build_router, GatewayConfig, GatewayState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "gatewayd")]
#[command(about = "FinLLM authorization gateway")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway HTTP server.
    Serve,

    /// Generate the RSA-2048 signing keypair this gateway needs at startup.
    ///
    /// Replaces the reference implementation's standalone key-generation
    /// script with a subcommand on the main binary.
    Keygen {
        /// Directory to write private_key.pem / public_key.pem into.
        #[arg(long, default_value = "./var/keys")]
        output: PathBuf,

        /// Optional passphrase to encrypt the private key with.
        #[arg(long, default_value = "")]
        passphrase: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("gatewayd=info".parse()?))
        .init();

    match cli.command {
        Commands::Serve => serve().await?,
        Commands::Keygen { output, passphrase } => keygen(output, &passphrase)?,
    }

    Ok(())
}

async fn serve() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env().map_err(|e| {
        error!(error = %e, "startup configuration error");
        anyhow::Error::from(e)
    })?;

    info!(bind = %config.bind_addr, state_dir = %config.state_dir.display(), "starting gatewayd");

    let state = Arc::new(GatewayState::bootstrap(&config).map_err(|e| {
        error!(error = %e, "startup bootstrap error");
        anyhow::Error::from(e)
    })?);

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "gatewayd listening");
    axum::serve(listener, app).await?;

    Ok(())
}

fn keygen(output: PathBuf, passphrase: &str) -> anyhow::Result<()> {
    let private_key_path = output.join("private_key.pem");
    let public_key_path = output.join("public_key.pem");

    gate_crypto::generate_keypair(&private_key_path, &public_key_path, passphrase)?;

    println!("Keypair written to:");
    println!("  {}", private_key_path.display());
    println!("  {}", public_key_path.display());

    Ok(())
}
