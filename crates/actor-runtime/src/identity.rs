//! Actor identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Composite `(kind, key)` address of one actor instance.
///
/// The rendered form `"{kind}-{key}"` is both the event stream name and the
/// namespace for the actor's reminders.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId {
    kind: String,
    key: String,
}

impl ActorId {
    pub fn new(kind: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            key: key.into(),
        }
    }

    /// Identity of the actor of type `A` with the given key.
    pub fn of<A: crate::Actor>(key: impl Into<String>) -> Self {
        Self::new(A::KIND, key)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Name of the event stream backing this actor.
    pub fn stream_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_kind_dash_key() {
        let id = ActorId::new("Cart", "1");
        assert_eq!(id.to_string(), "Cart-1");
        assert_eq!(id.stream_name(), "Cart-1");
        assert_eq!(id.kind(), "Cart");
        assert_eq!(id.key(), "1");
    }

    #[test]
    fn identities_differ_by_kind() {
        assert_ne!(ActorId::new("Cart", "1"), ActorId::new("Inventory", "1"));
    }
}
