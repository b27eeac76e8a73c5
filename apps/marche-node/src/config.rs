//! Command line and environment configuration

use clap::{ArgAction, Args, Parser, Subcommand};
use marche_store::MessagingConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Path to the SQLite database
    #[arg(long, global = true, env = "MARCHE_DATABASE", default_value = "marche.db")]
    pub database: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the messaging HTTP API
    Serve(ServeArgs),

    /// Register a marketplace user and print its id
    AddUser {
        /// Display name
        name: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "MARCHE_BIND", default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    /// Directory holding uploaded media
    #[arg(long, env = "MARCHE_MEDIA_DIR", default_value = "media")]
    pub media_dir: PathBuf,

    /// Public URL prefix prepended to stored media paths
    #[arg(long, env = "MARCHE_MEDIA_URL")]
    pub media_url: Option<String>,

    /// How long a heartbeat keeps a user online (e.g. "5m", "90s")
    #[arg(
        long,
        env = "MARCHE_PRESENCE_WINDOW",
        default_value = "5m",
        value_parser = humantime::parse_duration
    )]
    pub presence_window: Duration,

    /// Upper bound on a single media upload
    #[arg(
        long,
        env = "MARCHE_UPLOAD_TIMEOUT",
        default_value = "30s",
        value_parser = humantime::parse_duration
    )]
    pub upload_timeout: Duration,

    /// Record a presence heartbeat on every authenticated request
    #[arg(
        long,
        env = "MARCHE_TOUCH_PRESENCE",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub touch_presence: bool,

    /// Largest accepted request body in bytes
    #[arg(long, env = "MARCHE_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,
}

/// Fits the largest media ceiling (25 MiB video) once base64-encoded
pub const DEFAULT_MAX_BODY_BYTES: usize = 40 * 1024 * 1024;

impl ServeArgs {
    pub fn messaging_config(&self, db_path: PathBuf) -> MessagingConfig {
        MessagingConfig {
            db_path,
            presence_window: self.presence_window,
            upload_timeout: self.upload_timeout,
        }
    }
}
