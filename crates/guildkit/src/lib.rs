//! # guildkit
//!
//! A multi-tenant plugin runtime for guild chat bots.
//!
//! ## Overview
//!
//! Every guild the bot is in gets its own set of plugin instances, chosen by
//! the guild's configuration. Global plugins are instantiated once for the
//! whole process.
//!
//! ```text
//! ┌─────────┐  guildAvailable   ┌──────────────┐     ┌──────────────────────────────┐
//! │ Gateway │──────────────────▶│ GuildRuntime │────▶│ guild 1: [dep] ─▶ [welcome]  │
//! │         │  guildUnavailable │              │────▶│ guild 2: [moderation]        │
//! │         │  ready            │              │────▶│ global:  [cache]             │
//! └─────────┘                   └──────────────┘     └──────────────────────────────┘
//! ```
//!
//! - **Runtime**: turns availability signals into guild loads and unloads
//! - **Plugins**: declared once, instantiated per guild with lifecycle hooks
//!   that run in lockstep across a guild's instances
//! - **Services**: each instance owns its config overrides, event listeners,
//!   commands, locks and cooldowns
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use guildkit::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let welcome = PluginDefinition::<()>::guild("welcome")
//!         .message_command(MessageCommand::new("hello", |ctx| async move {
//!             info!(user = %ctx.message.author, "Hello!");
//!             Ok(())
//!         }))
//!         .build();
//!
//!     let gateway = EventBus::shared();
//!     let runtime = GuildRuntime::builder()
//!         .guild_plugins([welcome.erase()])
//!         .accessor(StaticConfigAccessor::new().enable(1u64, ["welcome"]))
//!         .event_source(gateway.clone())
//!         .init_logging(true)
//!         .build()?;
//!
//!     runtime.initialize().await?;
//!     gateway.emit(GuildAvailable { guild_id: GuildId(1) });
//!     // ...
//!     runtime.destroy().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: read `guildkit.toml` runtime config files (default)
//! - `yaml-config`: read `guildkit.yaml` runtime config files
//! - `json-log`: JSON log output

pub use guildkit_core as core;
pub use guildkit_framework as framework;
pub use guildkit_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use guildkit::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use guildkit_runtime::{
        ConfigAccessor, GuildRuntime, GuildStatus, RuntimeError, StaticConfigAccessor,
    };

    // Plugin authoring
    pub use guildkit_framework::prelude::*;

    // Entities and events
    pub use guildkit_core::{
        BoxError, EventBus, EventSource, GuildAvailable, GuildId, GuildUnavailable, Message,
        MessageCreate, Ready, UserId,
    };

    pub use guildkit_runtime::prelude::*;
}
