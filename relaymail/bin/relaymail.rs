#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use relaymail::{
    Config, Controller,
    config::find_config_file,
};
use relaymail_common::{
    credential::{DEFAULT_COST, hash_password},
    logging,
};

/// Authenticated SMTP intake with relay-aware outbound delivery
#[derive(Parser, Debug)]
#[command(name = "relaymail")]
#[command(version)]
struct Cli {
    /// Configuration file; falls back to `RELAYMAIL_CONFIG` and the default
    /// locations
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the SMTP listeners (default)
    Serve,
    /// Deliver one message through the configured relays or directly by MX
    Send {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long, default_value = "")]
        subject: String,
        /// Message body
        #[arg(long, conflicts_with = "body_file")]
        body: Option<String>,
        /// Read the message body from a file
        #[arg(long)]
        body_file: Option<PathBuf>,
    },
    /// Print a bcrypt hash suitable for the `users` section
    HashPassword { password: String },
}

fn load_config(explicit: Option<&std::path::Path>) -> anyhow::Result<Config> {
    let path = find_config_file(explicit)?;
    let mut config = Config::load(&path)?;
    config.apply_env(std::env::vars());
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            logging::init();
            let config = load_config(cli.config.as_deref())?;
            Controller::new(config).run().await
        }
        Commands::Send {
            from,
            to,
            subject,
            body,
            body_file,
        } => {
            logging::init();
            let body = match (body, body_file) {
                (Some(body), _) => body,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                (None, None) => anyhow::bail!("One of --body or --body-file is required"),
            };

            let config = load_config(cli.config.as_deref())?;
            Controller::new(config)
                .sender()?
                .send_external_mail(&from, &to, &subject, &body)
                .await?;

            println!("Delivered to {to}");
            Ok(())
        }
        Commands::HashPassword { password } => {
            println!("{}", hash_password(&password, DEFAULT_COST)?);
            Ok(())
        }
    }
}
