pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "thorne")]
#[command(about = "Encrypted ledgers and key exchange for Thorne accounts")]
pub struct Args {
    /// Path to the thorne config directory (defaults to ~/.thorne)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// Passphrase protecting the identity store
    #[arg(long, global = true, env = "THORNE_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,

    #[command(subcommand)]
    pub command: crate::Command,
}
