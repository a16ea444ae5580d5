//! Event system for guildkit.
//!
//! This module provides the core event infrastructure:
//!
//! - [`Event`] - Base trait for all activity events
//! - [`NamedEvent`] - Events with a statically known name, used for typed listeners
//! - [`BoxedEvent`] - Cheaply cloneable, type-erased event handle
//! - The built-in gateway events ([`MessageCreate`], [`GuildAvailable`], ...)
//!
//! Every event carries a name (the key listeners subscribe under) and an
//! optional associated guild. Guild-scoped plugin listeners only ever observe
//! events whose guild matches their own; events without a guild are global.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::entity::{Channel, Interaction, Message};
use super::id::{GuildId, UserId};

// ============================================================================
// Core Event Trait
// ============================================================================

/// The base trait for all events delivered through an
/// [`EventSource`](crate::EventSource).
///
/// Events are type-erased as `dyn Event` and downcast with
/// [`BoxedEvent::downcast`].
pub trait Event: Any + Send + Sync + fmt::Debug {
    /// Returns the name listeners subscribe under (e.g. `"messageCreate"`).
    fn event_name(&self) -> &'static str;

    /// Returns the guild this event belongs to, if any.
    fn guild_id(&self) -> Option<GuildId> {
        None
    }

    /// Returns a reference to self as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// An [`Event`] whose name is known at compile time.
///
/// Kept separate from [`Event`] so that `dyn Event` stays object-safe.
pub trait NamedEvent: Event + Sized {
    /// The event name.
    const NAME: &'static str;
}

// ============================================================================
// BoxedEvent
// ============================================================================

/// A type-erased, reference-counted event.
///
/// Cloning is cheap; every listener of one emission receives a clone of the
/// same allocation.
#[derive(Clone)]
pub struct BoxedEvent {
    inner: Arc<dyn Event>,
}

impl BoxedEvent {
    /// Wraps a concrete event.
    pub fn new<E: Event>(event: E) -> Self {
        Self {
            inner: Arc::new(event),
        }
    }

    /// Returns the event name.
    pub fn event_name(&self) -> &'static str {
        self.inner.event_name()
    }

    /// Returns the guild this event belongs to, if any.
    pub fn guild_id(&self) -> Option<GuildId> {
        self.inner.guild_id()
    }

    /// Attempts to view the event as `E`.
    pub fn downcast<E: Event>(&self) -> Option<&E> {
        self.inner.as_any().downcast_ref::<E>()
    }

    /// Returns `true` if the event is of type `E`.
    pub fn is<E: Event>(&self) -> bool {
        self.inner.as_any().is::<E>()
    }
}

impl fmt::Debug for BoxedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BoxedEvent").field(&self.inner).finish()
    }
}

impl<E: Event> From<E> for BoxedEvent {
    fn from(event: E) -> Self {
        Self::new(event)
    }
}

// ============================================================================
// Built-in events
// ============================================================================

macro_rules! impl_event {
    ($ty:ty, $name:literal, |$this:ident| $guild:expr) => {
        impl Event for $ty {
            fn event_name(&self) -> &'static str {
                $name
            }

            fn guild_id(&self) -> Option<GuildId> {
                let $this = self;
                $guild
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }

        impl NamedEvent for $ty {
            const NAME: &'static str = $name;
        }
    };
}

/// A message was posted.
#[derive(Debug, Clone)]
pub struct MessageCreate {
    pub message: Message,
}

impl_event!(MessageCreate, "messageCreate", |e| e.message.guild_id);

/// An application command was invoked.
#[derive(Debug, Clone)]
pub struct InteractionCreate {
    pub interaction: Interaction,
}

impl_event!(InteractionCreate, "interactionCreate", |e| e
    .interaction
    .guild_id);

/// A channel was created.
#[derive(Debug, Clone)]
pub struct ChannelCreate {
    pub channel: Channel,
}

impl_event!(ChannelCreate, "channelCreate", |e| e.channel.guild_id);

/// A user's account-level profile changed. Never guild-scoped.
#[derive(Debug, Clone)]
pub struct UserUpdate {
    pub user_id: UserId,
}

impl_event!(UserUpdate, "userUpdate", |_e| None);

/// The gateway reported a guild as available (joined, or back from an outage).
#[derive(Debug, Clone, Copy)]
pub struct GuildAvailable {
    pub guild_id: GuildId,
}

impl_event!(GuildAvailable, "guildAvailable", |e| Some(e.guild_id));

/// The gateway reported a guild as unavailable (left, or an outage).
#[derive(Debug, Clone, Copy)]
pub struct GuildUnavailable {
    pub guild_id: GuildId,
}

impl_event!(GuildUnavailable, "guildUnavailable", |e| Some(e.guild_id));

/// All guild-available signals known to the current connection have been
/// delivered.
#[derive(Debug, Clone, Default)]
pub struct Ready {
    /// Guilds the connection knows about.
    pub guilds: Vec<GuildId>,
}

impl_event!(Ready, "ready", |_e| None);
