//! Foundation layer: identifiers, entities and the event type system.

pub mod entity;
pub mod event;
pub mod id;

pub use entity::{Channel, Interaction, Message};
pub use event::{
    BoxedEvent, ChannelCreate, Event, GuildAvailable, GuildUnavailable, InteractionCreate,
    MessageCreate, NamedEvent, Ready, UserUpdate,
};
pub use id::{ChannelId, GuildId, InteractionId, MessageId, RoleId, UserId};
