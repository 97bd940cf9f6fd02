//! Opaque identifier newtypes.
//!
//! All ids are plain strings at the protocol boundary; the newtypes exist so
//! a `ChatId` and a `MsgId` can never be swapped by accident at a call site.

use std::fmt;

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

opaque_id!(ChatId);
opaque_id!(MsgId);
opaque_id!(UserId);
opaque_id!(FileId);

/// Identifies one logged-in account. Format `<protocol>_<suffix>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ProfileId(pub String);

impl ProfileId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The protocol prefix, extracted by splitting on the first `_`.
    pub fn protocol_prefix(&self) -> &str {
        self.0.split('_').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ProfileId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProfileId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Sentinel sender id used by [`crate::data::Reactions`] to denote the self-reaction.
pub const SELF_REACTION_SENDER: &str = "You";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_prefix_splits_on_first_underscore() {
        let p = ProfileId::new("telegram_12345");
        assert_eq!(p.protocol_prefix(), "telegram");
    }

    #[test]
    fn protocol_prefix_handles_multiple_underscores() {
        let p = ProfileId::new("whatsapp_acct_7");
        assert_eq!(p.protocol_prefix(), "whatsapp");
    }

    #[test]
    fn protocol_prefix_no_underscore_returns_whole_string() {
        let p = ProfileId::new("signal");
        assert_eq!(p.protocol_prefix(), "signal");
    }

    #[test]
    fn ids_display_as_inner_string() {
        let c = ChatId::new("abc");
        assert_eq!(c.to_string(), "abc");
    }
}
