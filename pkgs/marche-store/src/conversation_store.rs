//! Conversation store - creates and looks up conversations between parties

use crate::clock::{from_millis, Clock};
use crate::entities::conversations;
use crate::error::{is_unique_violation, Error, Result};
use crate::identity::{Party, UserId};
use crate::user_store::UserDirectory;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Conversation between two parties
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conversation {
    pub id: i64,
    pub first_party_id: UserId,
    /// `None` when the counterpart is an anonymous visitor
    pub second_party_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_anonymous_party(&self) -> bool {
        self.second_party_id.is_none()
    }

    /// The party facing `viewer`. `Party::Anonymous` for the visitor side.
    pub fn other_party(&self, viewer: UserId) -> Party {
        if viewer == self.first_party_id {
            Party::from_user_id(self.second_party_id)
        } else {
            Party::Known(self.first_party_id)
        }
    }
}

impl From<conversations::Model> for Conversation {
    fn from(m: conversations::Model) -> Self {
        Self {
            id: m.id,
            first_party_id: m.first_party_id,
            second_party_id: m.second_party_id,
            created_at: from_millis(m.created_at),
            updated_at: from_millis(m.updated_at),
        }
    }
}

/// Canonical key of an authenticated pair, independent of who started it
pub fn pair_key(a: UserId, b: UserId) -> String {
    format!("{}:{}", a.min(b), a.max(b))
}

/// Conversation store
#[derive(Clone)]
pub struct ConversationStore {
    db: DatabaseConnection,
    users: Arc<dyn UserDirectory>,
    clock: Arc<dyn Clock>,
}

impl ConversationStore {
    pub fn new(
        db: DatabaseConnection,
        users: Arc<dyn UserDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { db, users, clock }
    }

    /// Find the conversation between `caller` and `counterpart_id`, creating
    /// it when needed. The flag is true when a row was inserted.
    ///
    /// Anonymous callers always get a fresh conversation with the
    /// counterpart as first party.
    pub async fn start_or_get(
        &self,
        caller: Party,
        counterpart_id: Option<UserId>,
    ) -> Result<(Conversation, bool)> {
        let counterpart = counterpart_id
            .ok_or_else(|| Error::validation("counterpart_id", "counterpart required"))?;

        if caller.user_id() == Some(counterpart) {
            return Err(Error::validation(
                "counterpart_id",
                "cannot start a conversation with yourself",
            ));
        }

        if !self.users.exists(counterpart).await? {
            return Err(Error::validation(
                "counterpart_id",
                format!("user {} does not exist", counterpart),
            ));
        }

        if let Some(id) = caller.user_id() {
            if !self.users.exists(id).await? {
                return Err(Error::validation(
                    "caller",
                    format!("user {} does not exist", id),
                ));
            }
        }

        let now = self.clock.now().timestamp_millis();

        let caller_id = match caller {
            Party::Anonymous => {
                let conv = self.insert(counterpart, None, None, now).await?;
                info!(
                    "Opened anonymous conversation {} with user {}",
                    conv.id, counterpart
                );
                return Ok((conv, true));
            }
            Party::Known(id) => id,
        };

        if let Some(existing) = self.find_pair(caller_id, counterpart).await? {
            debug!(
                "Reusing conversation {} between {} and {}",
                existing.id, caller_id, counterpart
            );
            return Ok((existing, false));
        }

        let key = pair_key(caller_id, counterpart);
        match self
            .insert(caller_id, Some(counterpart), Some(key.clone()), now)
            .await
        {
            Ok(conv) => {
                info!(
                    "Opened conversation {} between {} and {}",
                    conv.id, caller_id, counterpart
                );
                Ok((conv, true))
            }
            Err(Error::Database(e)) if is_unique_violation(&e) => {
                // Lost the race against a concurrent insert of the same pair
                debug!("Concurrent insert for pair {}, re-reading", key);
                let model = conversations::Entity::find()
                    .filter(conversations::Column::PairKey.eq(key.as_str()))
                    .one(&self.db)
                    .await?
                    .ok_or(Error::Database(e))?;
                Ok((model.into(), false))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get(&self, id: i64) -> Result<Conversation> {
        conversations::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(Conversation::from)
            .ok_or_else(|| Error::conversation_not_found(id))
    }

    /// Conversations where the user is a party, most recent activity first
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Conversation>> {
        let convs = conversations::Entity::find()
            .filter(
                Condition::any()
                    .add(conversations::Column::FirstPartyId.eq(user_id))
                    .add(conversations::Column::SecondPartyId.eq(user_id)),
            )
            .order_by_desc(conversations::Column::UpdatedAt)
            .order_by_desc(conversations::Column::Id)
            .all(&self.db)
            .await?;

        Ok(convs.into_iter().map(Conversation::from).collect())
    }

    async fn find_pair(&self, a: UserId, b: UserId) -> Result<Option<Conversation>> {
        let conv = conversations::Entity::find()
            .filter(
                Condition::any()
                    .add(
                        Condition::all()
                            .add(conversations::Column::FirstPartyId.eq(a))
                            .add(conversations::Column::SecondPartyId.eq(b)),
                    )
                    .add(
                        Condition::all()
                            .add(conversations::Column::FirstPartyId.eq(b))
                            .add(conversations::Column::SecondPartyId.eq(a)),
                    ),
            )
            .order_by_asc(conversations::Column::Id)
            .one(&self.db)
            .await?;

        Ok(conv.map(Conversation::from))
    }

    async fn insert(
        &self,
        first_party_id: UserId,
        second_party_id: Option<UserId>,
        pair_key: Option<String>,
        now: i64,
    ) -> Result<Conversation> {
        let conv = conversations::ActiveModel {
            first_party_id: Set(first_party_id),
            second_party_id: Set(second_party_id),
            pair_key: Set(pair_key),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let res = conversations::Entity::insert(conv).exec(&self.db).await?;
        self.get(res.last_insert_id).await
    }
}

/// Bump `updated_at` on any connection, including an open transaction.
pub(crate) async fn touch_in<C: ConnectionTrait>(db: &C, id: i64, at: DateTime<Utc>) -> Result<()> {
    let res = conversations::Entity::update_many()
        .col_expr(
            conversations::Column::UpdatedAt,
            Expr::value(at.timestamp_millis()),
        )
        .filter(conversations::Column::Id.eq(id))
        .exec(db)
        .await?;

    if res.rows_affected == 0 {
        return Err(Error::conversation_not_found(id));
    }
    Ok(())
}
