//! # Call Context
//!
//! Per-call metadata threaded through every send, local or remote. It replaces
//! ambient request state: a [`Turn`](crate::Turn) builds the context for its
//! outbound sends from the executing actor, so handlers never pass an origin by
//! hand, and external callers start from [`CallContext::external`].

use crate::identity::ActorId;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallContext {
    origin: Option<ActorId>,
    correlation_id: Uuid,
}

impl CallContext {
    /// Context for a caller outside any actor.
    pub fn external() -> Self {
        Self {
            origin: None,
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Context for a send made by `origin` while handling a call correlated by
    /// `correlation_id`.
    pub fn from_actor(origin: ActorId, correlation_id: Uuid) -> Self {
        Self {
            origin: Some(origin),
            correlation_id,
        }
    }

    /// Identity of the actor that sent the message, if any.
    pub fn origin(&self) -> Option<&ActorId> {
        self.origin.as_ref()
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Whether a call to `target` is the origin calling itself.
    ///
    /// This is the only signal for the interleave flag: a reentrant call must
    /// bypass the target's mailbox or it waits on its own in-flight turn.
    pub fn is_reentrant_for(&self, target: &ActorId) -> bool {
        self.origin.as_ref() == Some(target)
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::external()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_calls_are_never_reentrant() {
        let ctx = CallContext::external();
        assert!(ctx.origin().is_none());
        assert!(!ctx.is_reentrant_for(&ActorId::new("Cart", "1")));
    }

    #[test]
    fn reentrant_only_for_the_same_identity() {
        let cart = ActorId::new("Cart", "1");
        let ctx = CallContext::from_actor(cart.clone(), Uuid::new_v4());
        assert!(ctx.is_reentrant_for(&cart));
        assert!(!ctx.is_reentrant_for(&ActorId::new("Cart", "2")));
        assert!(!ctx.is_reentrant_for(&ActorId::new("Inventory", "1")));
    }
}
