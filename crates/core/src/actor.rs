//! Actor identities
//!
//! Every ledger-mutating operation is attributed to an actor: either one of
//! the (at most two) trusted operators, or the system itself (expiry sweep,
//! trust auto-promotion). Actors round-trip through store text columns.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Who performed an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Actor {
    /// A trusted operator, identified by their chat user id
    Operator(i64),
    /// The system: confirmation expiry sweep, trust auto-promotion
    System,
}

impl Actor {
    pub fn is_system(&self) -> bool {
        matches!(self, Actor::System)
    }

    /// Operator id, if this is an operator
    pub fn operator_id(&self) -> Option<i64> {
        match self {
            Actor::Operator(id) => Some(*id),
            Actor::System => None,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Operator(id) => write!(f, "{id}"),
            Actor::System => write!(f, "system"),
        }
    }
}

impl FromStr for Actor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "system" {
            return Ok(Actor::System);
        }
        s.parse::<i64>()
            .map(Actor::Operator)
            .map_err(|_| format!("invalid actor: {s:?}"))
    }
}

impl From<Actor> for String {
    fn from(actor: Actor) -> Self {
        actor.to_string()
    }
}

impl TryFrom<String> for Actor {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_roundtrip() {
        let actor = Actor::Operator(6448246938);
        let text = actor.to_string();
        assert_eq!(text, "6448246938");
        assert_eq!(text.parse::<Actor>().unwrap(), actor);
    }

    #[test]
    fn test_system_roundtrip() {
        let text = Actor::System.to_string();
        assert_eq!(text, "system");
        assert_eq!(text.parse::<Actor>().unwrap(), Actor::System);
        assert!(Actor::System.is_system());
    }

    #[test]
    fn test_invalid_actor_rejected() {
        assert!("not-an-actor".parse::<Actor>().is_err());
    }

    #[test]
    fn test_operator_id() {
        assert_eq!(Actor::Operator(7).operator_id(), Some(7));
        assert_eq!(Actor::System.operator_id(), None);
    }
}
