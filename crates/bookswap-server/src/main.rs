// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bookswap Server binary.

use anyhow::Result;
use bookswap_core::{Identity, Role};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use bookswap_server::config::Config;
use bookswap_server::server;

/// Bookswap server CLI
#[derive(Parser)]
#[command(name = "bookswap-server")]
#[command(about = "Book exchange marketplace HTTP API", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Print an access token signed with the configured secret
    IssueToken {
        /// User the token is issued for
        #[arg(long)]
        user_id: i64,
        /// USER or ADMIN
        #[arg(long, default_value = "USER")]
        role: Role,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bookswap_server=info".parse()?)
                .add_directive("bookswap_core=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            info!(
                http_addr = %config.http_addr,
                images_dir = %config.images_dir.display(),
                max_connections = config.db_max_connections,
                "Starting Bookswap server"
            );
            server::run(config).await
        }
        Command::IssueToken { user_id, role } => {
            let token = server::issue_token(&config, Identity { user_id, role })?;
            info!(user_id, %role, "Access token issued");
            println!("{}", token);
            Ok(())
        }
    }
}
