//! Caller identity for message exchanges

use crate::conversation_store::Conversation;
use serde::{Deserialize, Serialize};

/// Numeric id of an authenticated marketplace user.
pub type UserId = i64;

/// The participant on one side of a message exchange.
///
/// Anonymous visitors have no persistent handle; they keep the conversation
/// id they were given when the conversation was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Party {
    Known(UserId),
    Anonymous,
}

impl Party {
    pub fn from_user_id(user_id: Option<UserId>) -> Self {
        match user_id {
            Some(id) => Party::Known(id),
            None => Party::Anonymous,
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Party::Known(id) => Some(*id),
            Party::Anonymous => None,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Party::Anonymous)
    }

    /// Membership rule: first party, second party, or the anonymous side of
    /// a conversation whose second party is empty.
    pub fn is_member_of(&self, conversation: &Conversation) -> bool {
        match (self, conversation.second_party_id) {
            (Party::Known(id), second) => {
                *id == conversation.first_party_id || second == Some(*id)
            }
            (Party::Anonymous, None) => true,
            (Party::Anonymous, Some(_)) => false,
        }
    }
}
