//! Message store - appends messages, lists history and tracks read state.
//!
//! Sending a message with a file is a small saga: the bytes go to the media
//! store first, then the message row and the conversation's last-activity
//! bump are written in one transaction. When the upload errors or times out,
//! or the transaction fails, the object is deleted again on a best-effort
//! basis; a failed delete is logged and leaves an orphaned object behind.

use crate::clock::{from_millis, Clock};
use crate::conversation_store::{touch_in, Conversation, ConversationStore};
use crate::entities::messages;
use crate::error::{Error, Result};
use crate::identity::{Party, UserId};
use crate::media::{MediaError, MediaStore};
use crate::message_type::MessageType;
use crate::payload::{NewMessage, PendingUpload, ValidatedMessage};
use crate::user_store::{UserDirectory, UserSummary};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Message as returned to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageView {
    pub id: i64,
    pub conversation_id: i64,
    /// `None` for messages sent by the anonymous party
    pub sender_id: Option<UserId>,
    pub sender: Option<UserSummary>,
    pub content: String,
    pub message_type: MessageType,
    pub file_path: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl MessageView {
    fn from_model(m: messages::Model, sender: Option<UserSummary>) -> Result<Self> {
        let message_type = m.message_type.parse::<MessageType>().map_err(|e| {
            Error::Database(DbErr::Custom(format!("message {}: {}", m.id, e)))
        })?;

        Ok(Self {
            id: m.id,
            conversation_id: m.conversation_id,
            sender_id: m.sender_id,
            sender,
            content: m.content,
            message_type,
            file_path: m.file_path,
            latitude: m.latitude,
            longitude: m.longitude,
            read_at: m.read_at.map(from_millis),
            created_at: from_millis(m.created_at),
        })
    }

    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

/// Message store
#[derive(Clone)]
pub struct MessageStore {
    db: DatabaseConnection,
    conversations: ConversationStore,
    users: Arc<dyn UserDirectory>,
    media: Arc<dyn MediaStore>,
    clock: Arc<dyn Clock>,
    upload_timeout: Duration,
}

impl MessageStore {
    pub fn new(
        db: DatabaseConnection,
        conversations: ConversationStore,
        users: Arc<dyn UserDirectory>,
        media: Arc<dyn MediaStore>,
        clock: Arc<dyn Clock>,
        upload_timeout: Duration,
    ) -> Self {
        Self {
            db,
            conversations,
            users,
            media,
            clock,
            upload_timeout,
        }
    }

    /// Load the conversation and check the caller belongs to it.
    async fn member_conversation(&self, conversation_id: i64, caller: Party) -> Result<Conversation> {
        let conv = self.conversations.get(conversation_id).await?;
        if !caller.is_member_of(&conv) {
            debug!("{:?} rejected from conversation {}", caller, conversation_id);
            return Err(Error::Forbidden { conversation_id });
        }
        Ok(conv)
    }

    /// Append a message on behalf of `caller`.
    pub async fn append(
        &self,
        conversation_id: i64,
        caller: Party,
        payload: NewMessage,
    ) -> Result<MessageView> {
        let conv = self.member_conversation(conversation_id, caller).await?;
        let message = payload.validate()?;

        // Resolved before anything is written so a lookup failure cannot
        // follow a committed row
        let sender = match caller.user_id() {
            Some(id) => self.users.get(id).await?,
            None => None,
        };

        let file_path = match &message.upload {
            Some(upload) => Some(self.upload(upload).await?),
            None => None,
        };

        let model = match self
            .persist(conv.id, caller, &message, file_path.clone())
            .await
        {
            Ok(model) => model,
            Err(e) => {
                if let Some(path) = file_path {
                    self.compensate(&path).await;
                }
                return Err(e);
            }
        };

        info!(
            "Message {} ({}) appended to conversation {}",
            model.id, message.message_type, conv.id
        );

        MessageView::from_model(model, sender)
    }

    async fn upload(&self, upload: &PendingUpload) -> Result<String> {
        let stored = tokio::time::timeout(
            self.upload_timeout,
            self.media
                .store(upload.policy.folder, &upload.file_name, &upload.bytes),
        )
        .await;

        let err = match stored {
            Ok(Ok(path)) if !path.trim().is_empty() => {
                debug!("Uploaded {} bytes to {}", upload.bytes.len(), path);
                return Ok(path);
            }
            Ok(Ok(_)) => MediaError::Unusable("media store returned an empty path".to_string()),
            Ok(Err(e)) => e,
            Err(_) => MediaError::Timeout(self.upload_timeout),
        };

        // The object may be partly written under its final name
        let path = format!("{}/{}", upload.policy.folder, upload.file_name);
        self.compensate(&path).await;
        Err(Error::MediaUpload(err))
    }

    /// Insert the row and bump the conversation in one transaction.
    async fn persist(
        &self,
        conversation_id: i64,
        caller: Party,
        message: &ValidatedMessage,
        file_path: Option<String>,
    ) -> Result<messages::Model> {
        let now = self.clock.now();
        let txn = self.db.begin().await?;

        let row = messages::ActiveModel {
            conversation_id: Set(conversation_id),
            sender_id: Set(caller.user_id()),
            content: Set(message.content.clone()),
            message_type: Set(message.message_type.as_str().to_string()),
            file_path: Set(file_path),
            latitude: Set(message.location.map(|l| l.latitude)),
            longitude: Set(message.location.map(|l| l.longitude)),
            read_at: Set(None),
            created_at: Set(now.timestamp_millis()),
            ..Default::default()
        };
        let res = messages::Entity::insert(row).exec(&txn).await?;
        touch_in(&txn, conversation_id, now).await?;

        let model = messages::Entity::find_by_id(res.last_insert_id)
            .one(&txn)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("message {}", res.last_insert_id)))?;

        txn.commit().await?;
        Ok(model)
    }

    async fn compensate(&self, path: &str) {
        match self.media.delete(path).await {
            Ok(()) => debug!("Removed {} after failed send", path),
            Err(e) => warn!("Failed to remove orphaned media {}: {}", path, e),
        }
    }

    /// Mark every message the caller did not send as read. Returns the
    /// number of messages that changed state.
    pub async fn mark_read(&self, conversation_id: i64, caller: Party) -> Result<u64> {
        self.member_conversation(conversation_id, caller).await?;

        let now = self.clock.now().timestamp_millis();
        let res = messages::Entity::update_many()
            .col_expr(messages::Column::ReadAt, Expr::value(now))
            .filter(messages::Column::ConversationId.eq(conversation_id))
            .filter(messages::Column::ReadAt.is_null())
            .filter(not_sent_by(caller))
            .exec(&self.db)
            .await?;

        debug!(
            "Marked {} messages read in conversation {}",
            res.rows_affected, conversation_id
        );
        Ok(res.rows_affected)
    }

    /// Full history of a conversation, oldest first.
    pub async fn list_for_conversation(
        &self,
        conversation_id: i64,
        caller: Party,
    ) -> Result<Vec<MessageView>> {
        self.member_conversation(conversation_id, caller).await?;

        let rows = messages::Entity::find()
            .filter(messages::Column::ConversationId.eq(conversation_id))
            .order_by_asc(messages::Column::CreatedAt)
            .order_by_asc(messages::Column::Id)
            .all(&self.db)
            .await?;

        let sender_ids: Vec<UserId> = rows
            .iter()
            .filter_map(|m| m.sender_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let senders = self.users.get_many(&sender_ids).await?;

        rows.into_iter()
            .map(|m| {
                let sender = m.sender_id.and_then(|id| senders.get(&id).cloned());
                MessageView::from_model(m, sender)
            })
            .collect()
    }

    /// Unread messages addressed to `user_id`, per conversation. Conversations
    /// without unread messages are absent from the map.
    pub async fn unread_counts(
        &self,
        user_id: UserId,
        conversation_ids: &[i64],
    ) -> Result<HashMap<i64, u64>> {
        if conversation_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let counts: Vec<(i64, i64)> = messages::Entity::find()
            .select_only()
            .column(messages::Column::ConversationId)
            .column_as(Expr::col(messages::Column::Id).count(), "unread")
            .filter(messages::Column::ConversationId.is_in(conversation_ids.iter().copied()))
            .filter(messages::Column::ReadAt.is_null())
            .filter(not_sent_by(Party::Known(user_id)))
            .group_by(messages::Column::ConversationId)
            .into_tuple()
            .all(&self.db)
            .await?;

        Ok(counts
            .into_iter()
            .map(|(id, n)| (id, n.max(0) as u64))
            .collect())
    }
}

/// Messages whose sender is not `party`
fn not_sent_by(party: Party) -> Condition {
    match party {
        Party::Known(id) => Condition::any()
            .add(messages::Column::SenderId.is_null())
            .add(messages::Column::SenderId.ne(id)),
        Party::Anonymous => Condition::all().add(messages::Column::SenderId.is_not_null()),
    }
}
