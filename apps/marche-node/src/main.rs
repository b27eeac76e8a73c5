use anyhow::Context;
use clap::Parser;
use marche_node::config::{Cli, Command, ServeArgs};
use marche_node::{build_router, AppState};
use marche_store::{LocalMediaStore, MessagingService, SystemClock, UserStore};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("Invalid log filter")?;
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    match cli.command {
        Command::Serve(args) => serve(&cli.database, args).await,
        Command::AddUser { name } => add_user(&cli.database, &name).await,
    }
}

async fn serve(database: &Path, args: ServeArgs) -> anyhow::Result<()> {
    let config = args.messaging_config(database.to_path_buf());
    let db = marche_store::connect(&config.db_path).await?;

    let mut media = LocalMediaStore::new(&args.media_dir)
        .await
        .with_context(|| format!("Failed to prepare media dir {}", args.media_dir.display()))?;
    if let Some(url) = &args.media_url {
        media = media.with_public_prefix(url.as_str());
    }

    let service = MessagingService::new(db, Arc::new(media), Arc::new(SystemClock), &config);
    let state = AppState::new(service)
        .with_touch_presence(args.touch_presence)
        .with_max_body_bytes(args.max_body_bytes);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;
    info!(
        "Marché node listening on {} (presence window {})",
        args.bind,
        humantime::format_duration(config.presence_window)
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("Server error")?;

    Ok(())
}

async fn add_user(database: &Path, name: &str) -> anyhow::Result<()> {
    let db = marche_store::connect(database).await?;
    let user = UserStore::new(db)
        .create(name)
        .await
        .context("Failed to create user")?;
    println!("{}\t{}", user.id, user.name);
    Ok(())
}
