//! Matching criteria.
//!
//! A [`MatchKey`] decides which waiting participants are compatible. Zone
//! and explicit-room keys pair like with like; debate keys pair opposing
//! stances on the same question.

use serde::{Deserialize, Serialize};

/// Position taken in a debate pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stance {
    /// Arguing in favor of the question.
    For,
    /// Arguing against the question.
    Against,
}

impl Stance {
    /// The opposing stance.
    pub const fn opposite(self) -> Self {
        match self {
            Self::For => Self::Against,
            Self::Against => Self::For,
        }
    }
}

/// Criterion under which two participants are compatible for pairing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum MatchKey {
    /// Named zone; anyone waiting in the zone is a match.
    Zone {
        /// Zone name.
        name: String,
    },
    /// Explicit room key shared out of band between two participants.
    ExplicitRoom {
        /// The shared key.
        key: String,
    },
    /// Debate on a question; matches only the opposing stance.
    Debate {
        /// Question identifier.
        question: String,
        /// The requester's stance.
        stance: Stance,
    },
}

impl MatchKey {
    /// The key a complementary waiter would have enqueued under.
    ///
    /// Zone and explicit-room keys seek their own queue (like-seeks-like);
    /// debate keys seek the opposite stance on the same question.
    pub fn complement(&self) -> Self {
        match self {
            Self::Zone { .. } | Self::ExplicitRoom { .. } => self.clone(),
            Self::Debate { question, stance } => {
                Self::Debate { question: question.clone(), stance: stance.opposite() }
            },
        }
    }

    /// Prefix used when deriving a room id for a pairing under this key.
    pub fn room_prefix(&self) -> String {
        match self {
            Self::Zone { name } => name.clone(),
            Self::ExplicitRoom { key } => key.clone(),
            Self::Debate { question, .. } => format!("debate_{question}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_complement_is_itself() {
        let key = MatchKey::Zone { name: "starter_zone".into() };
        assert_eq!(key.complement(), key);
    }

    #[test]
    fn explicit_room_complement_is_itself() {
        let key = MatchKey::ExplicitRoom { key: "attic".into() };
        assert_eq!(key.complement(), key);
    }

    #[test]
    fn debate_complement_flips_stance_only() {
        let key = MatchKey::Debate { question: "q1".into(), stance: Stance::For };
        assert_eq!(key.complement(), MatchKey::Debate {
            question: "q1".into(),
            stance: Stance::Against
        });
        // Complement of the complement is the original key
        assert_eq!(key.complement().complement(), key);
    }

    #[test]
    fn match_key_wire_form() {
        let key = MatchKey::Debate { question: "q1".into(), stance: Stance::Against };
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, r#"{"kind":"debate","question":"q1","stance":"against"}"#);

        let back: MatchKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
