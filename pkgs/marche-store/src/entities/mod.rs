//! Sea-ORM entities for marche-store

pub mod conversations;
pub mod messages;
pub mod users;

pub use conversations::Entity as Conversation;
pub use messages::Entity as Message;
pub use users::Entity as User;
