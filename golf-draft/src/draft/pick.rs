// Participants, golfers, and committed pick records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Rank given to golfers whose source row carries no usable rank. Sorts
/// after every real rank, so unranked golfers are auto-picked last.
pub const UNRANKED: u32 = u32::MAX;

/// Normalize a participant identity (email) for storage and lookup.
///
/// Identities are compared trimmed and ASCII-lowercased everywhere, so
/// `" Ann@Example.com "` and `"ann@example.com"` name the same seat.
pub fn normalize_identity(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// A seat in the draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// Normalized identity key (email).
    pub email: String,
    /// Display name shown to other participants.
    pub name: String,
    /// Draft-order rank; 1 picks first in odd rounds.
    pub draft_order: u32,
    /// Whether this participant may start the draft and pick for others.
    pub is_admin: bool,
}

impl Participant {
    pub fn new(email: &str, name: &str, draft_order: u32, is_admin: bool) -> Self {
        Participant {
            email: normalize_identity(email),
            name: name.trim().to_string(),
            draft_order,
            is_admin,
        }
    }
}

/// A golfer in the shared pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Golfer {
    /// Unique name; picks refer to golfers by exact name.
    pub name: String,
    /// Lower is more desirable. [`UNRANKED`] when unknown.
    pub rank: u32,
}

impl Golfer {
    pub fn new(name: &str, rank: u32) -> Self {
        Golfer {
            name: name.trim().to_string(),
            rank,
        }
    }

    pub fn is_ranked(&self) -> bool {
        self.rank != UNRANKED
    }
}

/// A committed pick. Created once by the pick transaction and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pick {
    /// 1-indexed round the pick was made in.
    pub round: u32,
    /// 1-indexed overall pick number, unique across the draft.
    pub pick_number: u32,
    /// Identity of the participant the golfer went to.
    pub user_email: String,
    /// Display name at the time of the pick.
    pub user_name: String,
    pub golfer_name: String,
}

impl fmt::Display for Pick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} (round {}): {} -> {}",
            self.pick_number, self.round, self.golfer_name, self.user_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_identity_trims_and_lowercases() {
        assert_eq!(normalize_identity("  Ann@Example.COM "), "ann@example.com");
        assert_eq!(normalize_identity("bob@x.io"), "bob@x.io");
        assert_eq!(normalize_identity(""), "");
    }

    #[test]
    fn participant_new_normalizes_email_and_name() {
        let p = Participant::new(" Ann@Example.com", " Ann ", 1, true);
        assert_eq!(p.email, "ann@example.com");
        assert_eq!(p.name, "Ann");
        assert_eq!(p.draft_order, 1);
        assert!(p.is_admin);
    }

    #[test]
    fn unranked_sorts_after_ranked() {
        let mut pool = vec![Golfer::new("Nobody", UNRANKED), Golfer::new("Scheffler", 1)];
        pool.sort_by_key(|g| g.rank);
        assert_eq!(pool[0].name, "Scheffler");
        assert!(pool[0].is_ranked());
        assert!(!pool[1].is_ranked());
    }

    #[test]
    fn pick_serializes_camel_case() {
        let pick = Pick {
            round: 1,
            pick_number: 3,
            user_email: "ann@example.com".into(),
            user_name: "Ann".into(),
            golfer_name: "Rory McIlroy".into(),
        };
        let json = serde_json::to_value(&pick).unwrap();
        assert_eq!(json["pickNumber"], 3);
        assert_eq!(json["userEmail"], "ann@example.com");
        assert_eq!(json["golferName"], "Rory McIlroy");
    }

    #[test]
    fn pick_display() {
        let pick = Pick {
            round: 2,
            pick_number: 5,
            user_email: "bob@x.io".into(),
            user_name: "Bob".into(),
            golfer_name: "Jon Rahm".into(),
        };
        assert_eq!(pick.to_string(), "#5 (round 2): Jon Rahm -> Bob");
    }
}
