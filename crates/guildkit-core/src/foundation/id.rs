//! Snowflake-style entity identifiers.
//!
//! Every id is a `u64` newtype. On the wire ids are written as strings (the
//! chat platform's snowflakes do not fit in a JSON number safely) and accepted
//! as either strings or numbers, so override rules in hand-written config
//! files can use whichever form is convenient.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EntityIdError;

/// Any accepted wire form of an id.
#[doc(hidden)]
#[derive(Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Number(u64),
    Text(String),
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "RawId", into = "String")]
        pub struct $name(pub u64);

        impl $name {
            /// Wraps a raw snowflake.
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Returns the raw snowflake.
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = EntityIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<u64>()
                    .map(Self)
                    .map_err(|_| EntityIdError(s.to_string()))
            }
        }

        impl TryFrom<RawId> for $name {
            type Error = EntityIdError;

            fn try_from(raw: RawId) -> Result<Self, Self::Error> {
                match raw {
                    RawId::Number(n) => Ok(Self(n)),
                    RawId::Text(s) => s.parse(),
                }
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0.to_string()
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

define_id!(
    /// Identifies a guild (tenant).
    GuildId
);
define_id!(
    /// Identifies a channel.
    ChannelId
);
define_id!(
    /// Identifies a user.
    UserId
);
define_id!(
    /// Identifies a guild role.
    RoleId
);
define_id!(
    /// Identifies a message.
    MessageId
);
define_id!(
    /// Identifies an interaction.
    InteractionId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_accepts_string_and_number() {
        let a: UserId = serde_json::from_str("\"123456789012345678\"").unwrap();
        let b: UserId = serde_json::from_str("123456789012345678").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.get(), 123456789012345678);
    }

    #[test]
    fn test_id_serializes_as_string() {
        let json = serde_json::to_string(&RoleId::new(42)).unwrap();
        assert_eq!(json, "\"42\"");
    }

    #[test]
    fn test_id_rejects_garbage() {
        assert!(serde_json::from_str::<GuildId>("\"not-a-snowflake\"").is_err());
        assert!("12x".parse::<ChannelId>().is_err());
    }
}
