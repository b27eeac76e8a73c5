//! Conversation entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "conversations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub first_party_id: i64,          // Initiator, or the provider for anonymous contacts
    pub second_party_id: Option<i64>, // None = anonymous counterpart
    #[sea_orm(unique)]
    pub pair_key: Option<String>, // "{min}:{max}" for authenticated pairs only
    pub created_at: i64,
    pub updated_at: i64, // Last activity
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::messages::Entity")]
    Messages,
}

impl Related<super::messages::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Messages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
