//! # guildkit Core
//!
//! The foundation layer of the guildkit plugin runtime.
//!
//! ## Architecture Layers
//!
//! ### Foundation Layer
//!
//! Entities and the event type system:
//! - **Identifiers**: [`GuildId`], [`ChannelId`], [`UserId`], [`RoleId`], [`MessageId`]
//! - **Entities**: [`Message`], [`Interaction`], [`Channel`]
//! - **Events**: type-erased activity events ([`Event`], [`BoxedEvent`]) and the
//!   built-in gateway events ([`MessageCreate`], [`GuildAvailable`], [`Ready`], ...)
//!
//! ### Integration Layer
//!
//! The seam towards the chat-platform gateway client:
//! - [`EventSource`] - subscribe/unsubscribe named event listeners
//! - [`EventBus`] - in-process event source with copy-on-iterate dispatch
//!
//! ### Coordination Primitives
//!
//! Per-plugin-instance helpers for cooperating plugin code:
//! - [`LockManager`] - keyed FIFO mutual exclusion
//! - [`CooldownManager`] - keyed expiry tracking
//!
//! ```text
//! ┌─────────────┐  emit   ┌──────────┐  listener  ┌──────────────┐
//! │   Gateway   │────────▶│ EventBus │───────────▶│  EventScope  │──▶ plugin code
//! │   client    │         │          │───────────▶│ (per plugin) │
//! └─────────────┘         └──────────┘            └──────────────┘
//! ```

pub mod error;
pub mod foundation;
pub mod integration;
pub mod sync;

pub use error::{BoxError, EntityIdError, LockError, LookupError};
pub use foundation::{
    BoxedEvent, Channel, ChannelCreate, ChannelId, Event, GuildAvailable, GuildId,
    GuildUnavailable, Interaction, InteractionCreate, InteractionId, Message, MessageCreate,
    MessageId, NamedEvent, Ready, RoleId, UserId, UserUpdate,
};
pub use integration::{EventBus, EventSource, Listener, SubscriptionId};
pub use sync::{CooldownManager, Lock, LockManager};

/// Boxed future used for listeners, hooks and predicates throughout guildkit.
pub use futures::future::BoxFuture;

/// Prelude for common imports.
pub mod prelude {
    pub use super::foundation::*;
    pub use super::integration::{EventBus, EventSource, Listener, SubscriptionId};
    pub use super::sync::{CooldownManager, Lock, LockManager};
    pub use super::{BoxError, BoxFuture};
}
