//! Messaging service - the delivery/query façade used by the node

use crate::clock::Clock;
use crate::conversation_store::{Conversation, ConversationStore};
use crate::error::Result;
use crate::identity::{Party, UserId};
use crate::media::MediaStore;
use crate::message_store::{MessageStore, MessageView};
use crate::payload::NewMessage;
use crate::presence::PresenceTracker;
use crate::user_store::{UserDirectory, UserStore};
use crate::MessagingConfig;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;

/// Display name used for the anonymous side of a conversation
pub const ANONYMOUS_NAME: &str = "Anonymous visitor";

/// Name shown when the other party's account no longer resolves
const UNKNOWN_USER_NAME: &str = "Unknown user";

/// The party on the other side of a conversation, from the viewer's seat
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OtherParty {
    /// `None` for an anonymous visitor
    pub id: Option<UserId>,
    pub name: String,
    pub is_online: bool,
}

/// One entry of a user's inbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub other_party: OtherParty,
    pub unread_count: u64,
}

/// A conversation with its full history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationDetail {
    pub conversation: Conversation,
    pub messages: Vec<MessageView>,
}

/// Messaging service
#[derive(Clone)]
pub struct MessagingService {
    users: UserStore,
    conversations: ConversationStore,
    messages: MessageStore,
    presence: PresenceTracker,
}

impl MessagingService {
    pub fn new(
        db: DatabaseConnection,
        media: Arc<dyn MediaStore>,
        clock: Arc<dyn Clock>,
        config: &MessagingConfig,
    ) -> Self {
        let users = UserStore::new(db.clone());
        let directory: Arc<dyn UserDirectory> = Arc::new(users.clone());
        let conversations = ConversationStore::new(db.clone(), directory.clone(), clock.clone());
        let messages = MessageStore::new(
            db,
            conversations.clone(),
            directory,
            media,
            clock.clone(),
            config.upload_timeout,
        );
        let presence = PresenceTracker::new(users.clone(), clock, config.presence_window);

        Self {
            users,
            conversations,
            messages,
            presence,
        }
    }

    pub fn users(&self) -> &UserStore {
        &self.users
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub async fn start_conversation(
        &self,
        caller: Party,
        counterpart_id: Option<UserId>,
    ) -> Result<(Conversation, bool)> {
        self.conversations.start_or_get(caller, counterpart_id).await
    }

    /// Inbox of `user_id`, most recent activity first.
    pub async fn list_conversations_for(&self, user_id: UserId) -> Result<Vec<ConversationSummary>> {
        let convs = self.conversations.list_for_user(user_id).await?;

        let ids: Vec<i64> = convs.iter().map(|c| c.id).collect();
        let unread = self.messages.unread_counts(user_id, &ids).await?;

        let mut others: Vec<UserId> = convs
            .iter()
            .filter_map(|c| c.other_party(user_id).user_id())
            .collect();
        others.sort_unstable();
        others.dedup();
        let profiles = self.users.get_many(&others).await?;

        Ok(convs
            .into_iter()
            .map(|conversation| {
                let other_party = match conversation.other_party(user_id) {
                    Party::Anonymous => OtherParty {
                        id: None,
                        name: ANONYMOUS_NAME.to_string(),
                        is_online: false,
                    },
                    Party::Known(id) => match profiles.get(&id) {
                        Some(profile) => OtherParty {
                            id: Some(id),
                            name: profile.name.clone(),
                            is_online: self.presence.is_online_at(profile.last_seen_at),
                        },
                        None => OtherParty {
                            id: Some(id),
                            name: UNKNOWN_USER_NAME.to_string(),
                            is_online: false,
                        },
                    },
                };
                let unread_count = unread.get(&conversation.id).copied().unwrap_or(0);
                ConversationSummary {
                    conversation,
                    other_party,
                    unread_count,
                }
            })
            .collect())
    }

    pub async fn get_conversation(
        &self,
        conversation_id: i64,
        caller: Party,
    ) -> Result<ConversationDetail> {
        let messages = self
            .messages
            .list_for_conversation(conversation_id, caller)
            .await?;
        let conversation = self.conversations.get(conversation_id).await?;
        Ok(ConversationDetail {
            conversation,
            messages,
        })
    }

    pub async fn send(
        &self,
        conversation_id: i64,
        caller: Party,
        payload: NewMessage,
    ) -> Result<MessageView> {
        self.messages.append(conversation_id, caller, payload).await
    }

    pub async fn mark_as_read(&self, conversation_id: i64, caller: Party) -> Result<u64> {
        self.messages.mark_read(conversation_id, caller).await
    }
}
