use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "multimat")]
#[command(about = "Image upload and multi-format conversion service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server
    Server(ServerArgs),
    /// Delete every upload whose retention delay has passed, then exit
    Sweep(SweepArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Address to bind the HTTP server to (overrides server.bind_addr)
    #[arg(long)]
    pub address: Option<SocketAddr>,

    /// Path to a TOML config file (defaults to $MULTIMAT_CONFIG, then config/multimat.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct SweepArgs {
    /// Path to a TOML config file (defaults to $MULTIMAT_CONFIG, then config/multimat.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}
