use clap::Parser;
use std::path::PathBuf;

/// Server CLI for anycards-relay
#[derive(Parser, Debug, Clone)]
#[command(name = "anycards-relay", version, about = "Card game WebSocket relay")]
pub struct ServerCli {
    /// Path to config file
    #[arg(long, default_value = "anycards-relay.toml")]
    pub config: PathBuf,

    /// Port to listen on (overrides config.port)
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Enable debug logging
    #[arg(long, default_value_t = false)]
    pub debug: bool,

    /// Persist CLI overrides back to the config file
    #[arg(long, default_value_t = false)]
    pub persist: bool,
}
