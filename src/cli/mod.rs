use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod chat;
pub mod serve;
pub mod sessions;

use crate::core::AppConfig;

#[derive(Subcommand)]
enum Command {
    /// Run the API server
    Serve {
        /// Set the server host address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Set the server port
        #[arg(long, default_value = "5000")]
        port: String,
    },
    /// Start an interactive chat in a stored session
    Chat {
        /// Session to read history from and append to
        #[arg(long)]
        session: Option<String>,
    },
    /// List stored chat sessions
    Sessions {},
    /// Copy a stored session into a new session
    Branch {
        #[arg(long)]
        session: String,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();
    let config = AppConfig::default();

    // Handle each sub command
    match args.command {
        Some(Command::Serve { host, port }) => {
            serve::run(host, port, config).await?;
        }
        Some(Command::Chat { session }) => {
            let session_id = session.unwrap_or_else(|| config.default_session_id.clone());
            chat::run(&session_id, config).await?;
        }
        Some(Command::Sessions {}) => {
            sessions::list(config).await?;
        }
        Some(Command::Branch { session }) => {
            sessions::branch(&session, config).await?;
        }
        None => {}
    }

    Ok(())
}
