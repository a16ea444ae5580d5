//! Integration layer: the seam between guildkit and a chat-platform gateway.
//!
//! The gateway client itself is out of scope; anything that can register
//! named listeners and emit [`BoxedEvent`](crate::BoxedEvent)s implements
//! [`EventSource`]. [`EventBus`] is the in-process implementation used by
//! gateway bindings and by tests.

mod source;

pub use source::{EventBus, EventSource, Listener, SubscriptionId};
