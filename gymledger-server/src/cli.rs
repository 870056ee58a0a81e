use clap::{Parser, Subcommand};

const HELP_EPILOG: &str = r#"Server options can also be provided via environment variables:
  CONFIG_PATH (default: ./config.yaml)
  DB_PATH     (default: data/ledger.db)
  PORT        (default: 5151 or config.listen_port)
  RUST_LOG    (default: info)

Use `hash-password` to produce bcrypt hashes for the `users` section of the config.
"#;

#[derive(Debug, Parser)]
#[command(
    name = "gymledger-server",
    version,
    about = "Gym gamification ledger server",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    /// Optional subcommand. Without one, runs the server.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print a bcrypt hash of PASSWORD for use as `password_hash` in config
    HashPassword {
        password: String,
        /// bcrypt cost factor
        #[arg(long, default_value_t = bcrypt::DEFAULT_COST)]
        cost: u32,
    },
}
