use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "fleetgate", version, about = "Vehicle registry gateway")]
pub struct CliArgs {
    #[arg(long)]
    pub print_config: bool,
    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Generate an HS256 caller token (expires in 1h)
    GenToken {
        /// Caller account id, e.g. alice.testnet
        #[arg(long)]
        sub: String,
        /// Caller signing key, e.g. ed25519:<base58>
        #[arg(long)]
        public_key: String,
    },
    /// Print build & version metadata
    Version {
        #[arg(long)]
        json: bool,
    },
}
