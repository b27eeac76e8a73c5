//! User store - read access to marketplace users and their presence column

use crate::clock::from_millis;
use crate::entities::users;
use crate::error::{Error, Result};
use crate::identity::UserId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, Set,
};
use serde::Serialize;
use std::collections::HashMap;

/// Public view of a user, as shown next to messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl From<users::Model> for UserSummary {
    fn from(m: users::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            last_seen_at: m.last_seen_at.map(from_millis),
        }
    }
}

/// Read access to marketplace users
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn exists(&self, id: UserId) -> Result<bool>;

    async fn get(&self, id: UserId) -> Result<Option<UserSummary>>;

    /// Batch lookup keyed by id; missing ids are simply absent.
    async fn get_many(&self, ids: &[UserId]) -> Result<HashMap<UserId, UserSummary>>;
}

/// User store
#[derive(Clone)]
pub struct UserStore {
    db: DatabaseConnection,
}

impl UserStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Register a user. Account management lives elsewhere; this is used by
    /// the admin command and by tests.
    pub async fn create(&self, name: &str) -> Result<UserSummary> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("name", "name is required"));
        }

        let now = Utc::now().timestamp_millis();
        let user = users::ActiveModel {
            name: Set(name.to_string()),
            last_seen_at: Set(None),
            created_at: Set(now),
            ..Default::default()
        };
        let res = users::Entity::insert(user).exec(&self.db).await?;
        UserDirectory::get(self, res.last_insert_id)
            .await?
            .ok_or_else(|| Error::user_not_found(res.last_insert_id))
    }

    /// Record a heartbeat. Returns false when the user does not exist.
    pub async fn set_last_seen(&self, id: UserId, at: DateTime<Utc>) -> Result<bool> {
        let res = users::Entity::update_many()
            .col_expr(
                users::Column::LastSeenAt,
                Expr::value(at.timestamp_millis()),
            )
            .filter(users::Column::Id.eq(id))
            .exec(&self.db)
            .await?;

        Ok(res.rows_affected > 0)
    }
}

#[async_trait]
impl UserDirectory for UserStore {
    async fn exists(&self, id: UserId) -> Result<bool> {
        let count = users::Entity::find_by_id(id).count(&self.db).await?;
        Ok(count > 0)
    }

    async fn get(&self, id: UserId) -> Result<Option<UserSummary>> {
        let user = users::Entity::find_by_id(id).one(&self.db).await?;
        Ok(user.map(UserSummary::from))
    }

    async fn get_many(&self, ids: &[UserId]) -> Result<HashMap<UserId, UserSummary>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let users = users::Entity::find()
            .filter(users::Column::Id.is_in(ids.iter().copied()))
            .all(&self.db)
            .await?;

        Ok(users
            .into_iter()
            .map(|m| (m.id, UserSummary::from(m)))
            .collect())
    }
}
