//! Platform entities delivered by the gateway client.
//!
//! These are deliberately thin: the gateway collaborator owns the full entity
//! model, the runtime only needs the fields that scope events to guilds and
//! feed override matching.

use serde::{Deserialize, Serialize};

use super::id::{ChannelId, GuildId, InteractionId, MessageId, RoleId, UserId};

/// A message posted in a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    /// `None` for direct messages.
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub author: UserId,
    /// Roles held by the author in the message's guild.
    #[serde(default)]
    pub member_roles: Vec<RoleId>,
    #[serde(default)]
    pub content: String,
}

impl Message {
    /// Creates a direct (guild-less) message.
    pub fn new(
        id: impl Into<MessageId>,
        channel_id: impl Into<ChannelId>,
        author: impl Into<UserId>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            guild_id: None,
            channel_id: channel_id.into(),
            author: author.into(),
            member_roles: Vec::new(),
            content: content.into(),
        }
    }

    /// Places the message in a guild.
    pub fn in_guild(mut self, guild_id: impl Into<GuildId>) -> Self {
        self.guild_id = Some(guild_id.into());
        self
    }

    /// Sets the author's roles.
    pub fn with_roles(mut self, roles: impl IntoIterator<Item = RoleId>) -> Self {
        self.member_roles = roles.into_iter().collect();
        self
    }
}

/// An application-command invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: InteractionId,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub user_id: UserId,
    #[serde(default)]
    pub member_roles: Vec<RoleId>,
    /// Name of the invoked command.
    pub command_name: String,
    /// Raw command options, as delivered by the platform.
    #[serde(default)]
    pub options: serde_json::Value,
}

impl Interaction {
    /// Creates a guild-less interaction for the named command.
    pub fn new(
        id: impl Into<InteractionId>,
        channel_id: impl Into<ChannelId>,
        user_id: impl Into<UserId>,
        command_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            guild_id: None,
            channel_id: channel_id.into(),
            user_id: user_id.into(),
            member_roles: Vec::new(),
            command_name: command_name.into(),
            options: serde_json::Value::Null,
        }
    }

    /// Places the interaction in a guild.
    pub fn in_guild(mut self, guild_id: impl Into<GuildId>) -> Self {
        self.guild_id = Some(guild_id.into());
        self
    }

    /// Sets the invoking member's roles.
    pub fn with_roles(mut self, roles: impl IntoIterator<Item = RoleId>) -> Self {
        self.member_roles = roles.into_iter().collect();
        self
    }

    /// Sets the raw command options.
    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.options = options;
        self
    }
}

/// A channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
}

impl Channel {
    /// Creates a channel, optionally belonging to a guild.
    pub fn new(id: impl Into<ChannelId>, guild_id: Option<GuildId>) -> Self {
        Self {
            id: id.into(),
            guild_id,
        }
    }
}
