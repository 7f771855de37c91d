//! # Typed Identifiers
//!
//! Zero-cost wrappers that keep session and connection identifiers apart.
//!
//! - `SessionId` wraps the numeric id the transport assigns to a live TCP
//!   session. Callers hand it back as a text hint to reuse that session.
//! - `ConnectionId` wraps the opaque identifier of an administrator-defined
//!   connection definition.
//!
//! ```rust
//! use types::{SessionId, ValidationError};
//!
//! let id: SessionId = " 17 ".parse().unwrap();
//! assert_eq!(id.inner(), 17);
//! assert_eq!(id.to_string(), "17");
//!
//! assert_eq!("0".parse::<SessionId>(), Err(ValidationError::NullId));
//! assert!(matches!("abc".parse::<SessionId>(), Err(ValidationError::NotNumeric { .. })));
//! ```

use crate::common::errors::ValidationError;
use std::str::FromStr;

/// Macro for generating zero-cost typed u64 identifiers
///
/// The generated type displays as its bare decimal value so it can be handed
/// to callers and parsed back without ceremony.
#[macro_export]
macro_rules! define_typed_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Create a new typed ID
            #[inline(always)]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Create a new typed ID, rejecting the null value
            #[inline]
            pub fn new_validated(id: u64) -> Result<Self, $crate::common::errors::ValidationError> {
                if id == 0 {
                    return Err($crate::common::errors::ValidationError::NullId);
                }
                Ok(Self(id))
            }

            /// Extract the inner u64 value
            #[inline(always)]
            pub const fn inner(&self) -> u64 {
                self.0
            }

            /// Check if this is a null/zero ID
            #[inline(always)]
            pub fn is_null(&self) -> bool {
                self.0 == 0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            #[inline(always)]
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            #[inline(always)]
            fn from(id: $name) -> u64 {
                id.0
            }
        }

        #[cfg(feature = "serde")]
        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                self.0.serialize(serializer)
            }
        }

        #[cfg(feature = "serde")]
        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                u64::deserialize(deserializer).map(Self)
            }
        }
    };
}

define_typed_id!(
    /// Transport-assigned identifier of a live TCP session
    SessionId
);

impl FromStr for SessionId {
    type Err = ValidationError;

    /// Parse a caller-supplied session hint
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Empty);
        }
        let id = trimmed
            .parse::<u64>()
            .map_err(|_| ValidationError::NotNumeric {
                input: trimmed.to_string(),
            })?;
        Self::new_validated(id)
    }
}

/// Opaque identifier of a connection definition
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ConnectionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_parses_hint() {
        assert_eq!("42".parse::<SessionId>().unwrap(), SessionId::new(42));
        assert_eq!("  7\n".parse::<SessionId>().unwrap().inner(), 7);
    }

    #[test]
    fn test_session_id_rejects_bad_hints() {
        assert_eq!("".parse::<SessionId>(), Err(ValidationError::Empty));
        assert_eq!("0".parse::<SessionId>(), Err(ValidationError::NullId));
        assert!(matches!(
            "-3".parse::<SessionId>(),
            Err(ValidationError::NotNumeric { .. })
        ));
        assert!(matches!(
            "12abc".parse::<SessionId>(),
            Err(ValidationError::NotNumeric { .. })
        ));
    }

    #[test]
    fn test_session_id_display_round_trips() {
        let id = SessionId::new(981);
        assert_eq!(id.to_string().parse::<SessionId>().unwrap(), id);
    }

    #[test]
    fn test_connection_id_serde_is_transparent() {
        let id = ConnectionId::new("hl7-out");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"hl7-out\"");
        let back: ConnectionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
