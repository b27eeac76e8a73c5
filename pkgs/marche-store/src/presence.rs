//! Presence tracker - heartbeats and the derived online flag

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::identity::UserId;
use crate::user_store::{UserDirectory, UserStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Presence of one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceStatus {
    pub user_id: UserId,
    pub is_online: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
}

/// Presence tracker
///
/// A user is online while their last heartbeat is younger than `window`.
#[derive(Clone)]
pub struct PresenceTracker {
    users: UserStore,
    clock: Arc<dyn Clock>,
    window: Duration,
}

impl PresenceTracker {
    pub fn new(users: UserStore, clock: Arc<dyn Clock>, window: Duration) -> Self {
        Self {
            users,
            clock,
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record activity for `user_id` and return the stored timestamp.
    pub async fn heartbeat(&self, user_id: UserId) -> Result<DateTime<Utc>> {
        let now = self.clock.now();
        if !self.users.set_last_seen(user_id, now).await? {
            return Err(Error::user_not_found(user_id));
        }
        debug!("Heartbeat from user {}", user_id);
        Ok(now)
    }

    /// Unknown users and users without a heartbeat are offline.
    pub async fn is_online(&self, user_id: UserId) -> Result<bool> {
        let user = self.users.get(user_id).await?;
        Ok(user.is_some_and(|u| self.is_online_at(u.last_seen_at)))
    }

    pub async fn status(&self, user_id: UserId) -> Result<PresenceStatus> {
        let user = self
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| Error::user_not_found(user_id))?;

        Ok(PresenceStatus {
            user_id,
            is_online: self.is_online_at(user.last_seen_at),
            last_seen_at: user.last_seen_at,
        })
    }

    /// Online flag for a given last heartbeat
    pub fn is_online_at(&self, last_seen_at: Option<DateTime<Utc>>) -> bool {
        let Some(last_seen_at) = last_seen_at else {
            return false;
        };
        match (self.clock.now() - last_seen_at).to_std() {
            Ok(elapsed) => elapsed < self.window,
            // Heartbeat ahead of our clock
            Err(_) => true,
        }
    }
}
