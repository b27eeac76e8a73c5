//! Marché Store - conversation, message and presence storage for the Marché
//! marketplace
//!
//! This crate holds the messaging core: providers and customers open
//! conversations, exchange text and media messages, track what has been read
//! and see who is online. It is backed by SQLite through Sea-ORM.
//!
//! # Architecture
//!
//! - **ConversationStore**: at most one conversation per authenticated pair,
//!   a fresh one per anonymous contact
//! - **MessageStore**: append with media upload, chronological history,
//!   read tracking and unread counts
//! - **PresenceTracker**: heartbeats and the derived online flag
//! - **UserStore**: read access to marketplace users
//! - **MessagingService**: façade combining the above
//!
//! Media bytes live in a [`MediaStore`]; [`LocalMediaStore`] keeps them on
//! disk.
//!
//! # Database Schema
//!
//! - `users`: marketplace users and their last heartbeat
//! - `conversations`: pairs of parties, with a unique `pair_key` for
//!   authenticated pairs
//! - `messages`: content, type, attachment reference, location and read state
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use marche_store::{
//!     connect, LocalMediaStore, MessagingConfig, MessagingService, NewMessage, Party,
//!     SystemClock,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = MessagingConfig::default();
//! let db = connect(&config.db_path).await?;
//! let media = LocalMediaStore::new("media").await?;
//! let service = MessagingService::new(db, Arc::new(media), Arc::new(SystemClock), &config);
//!
//! let provider = service.users().create("Plomberie Martin").await?;
//! let (conversation, _created) = service
//!     .start_conversation(Party::Anonymous, Some(provider.id))
//!     .await?;
//! service
//!     .send(conversation.id, Party::Anonymous, NewMessage::text("Bonjour !"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod conversation_store;
pub mod entities;
pub mod error;
pub mod identity;
pub mod media;
pub mod message_store;
pub mod message_type;
pub mod messaging;
pub mod migration;
pub mod payload;
pub mod presence;
pub mod user_store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use conversation_store::{Conversation, ConversationStore};
pub use error::{Error, Result};
pub use identity::{Party, UserId};
pub use media::{LocalMediaStore, MediaError, MediaStore};
pub use message_store::{MessageStore, MessageView};
pub use message_type::{MediaPolicy, MessageType};
pub use messaging::{ConversationDetail, ConversationSummary, MessagingService, OtherParty};
pub use payload::{Attachment, NewMessage};
pub use presence::{PresenceStatus, PresenceTracker};
pub use user_store::{UserDirectory, UserStore, UserSummary};

use anyhow::Context;
use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Configuration for the messaging core
#[derive(Debug, Clone)]
pub struct MessagingConfig {
    /// Path to the SQLite database file
    pub db_path: std::path::PathBuf,

    /// A user is online while their last heartbeat is younger than this
    /// (default: 5 minutes)
    pub presence_window: Duration,

    /// Upper bound on a single media upload (default: 30s)
    pub upload_timeout: Duration,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            db_path: std::path::PathBuf::from("marche.db"),
            presence_window: Duration::from_secs(300),
            upload_timeout: Duration::from_secs(30),
        }
    }
}

/// Open (or create) the SQLite database at `db_path` and bring its schema up
/// to date.
pub async fn connect(db_path: &Path) -> anyhow::Result<DatabaseConnection> {
    let db_path_str = db_path
        .to_str()
        .context("Invalid database path")?
        .replace('\\', "/");

    let db_url = format!("sqlite:{}?mode=rwc", db_path_str);

    let db = Database::connect(db_url.as_str())
        .await
        .context("Failed to connect to database")?;

    migration::Migrator::up(&db, None)
        .await
        .context("Failed to run migrations")?;

    info!("Messaging store initialized at {}", db_path.display());
    Ok(db)
}
