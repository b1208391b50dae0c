//! Newtype identifiers for epic entities.
//!
//! Phase, task and test ids are authored by hand inside the epic document
//! (`P1`, `T1.2`, `X-login`), so they are only checked for shape. Epic ids
//! minted by `epic new` are prefixed ULIDs: `epic_01ARZ3NDEKTSV4RRFFQ69G5FAV`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IdParseError {
    #[error("Identifier must not be empty")]
    Empty,
    #[error("Invalid character {found:?} in identifier '{id}'")]
    InvalidChar { id: String, found: char },
}

fn validate_authored(s: &str) -> Result<(), IdParseError> {
    if s.is_empty() {
        return Err(IdParseError::Empty);
    }
    if let Some(found) = s
        .chars()
        .find(|c| c.is_whitespace() || matches!(c, '<' | '>' | '"' | '&'))
    {
        return Err(IdParseError::InvalidChar {
            id: s.to_string(),
            found,
        });
    }
    Ok(())
}

macro_rules! authored_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                validate_authored(s)?;
                Ok(Self(s.to_string()))
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

authored_id!(
    /// Phase id, unique within an epic.
    PhaseId
);
authored_id!(
    /// Task id, unique within an epic.
    TaskId
);
authored_id!(
    /// Test id, unique within an epic.
    TestId
);
authored_id!(
    /// Event id, unique within an epic's event log.
    EventId
);
authored_id!(EpicId);

impl EpicId {
    pub const PREFIX: &'static str = "epic_";

    /// Generate a new EpicId with a fresh ULID
    pub fn generate() -> Self {
        Self(format!("{}{}", Self::PREFIX, ulid::Ulid::new()))
    }

    /// ULID part of a generated id; authored ids are returned whole
    pub fn ulid_part(&self) -> &str {
        self.0.strip_prefix(Self::PREFIX).unwrap_or(&self.0)
    }
}

impl EventId {
    /// Event ids are `evt_` plus a zero-padded sequence number.
    pub fn sequenced(seq: usize) -> Self {
        Self(format!("evt_{seq:04}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_id_parse() {
        let id: PhaseId = "P1".parse().unwrap();
        assert_eq!(id.as_str(), "P1");
        assert_eq!(id, "P1");
    }

    #[test]
    fn empty_id_rejected() {
        let result: Result<TaskId, _> = "".parse();
        assert_eq!(result, Err(IdParseError::Empty));
    }

    #[test]
    fn whitespace_id_rejected() {
        let result: Result<TestId, _> = "X 1".parse();
        assert!(matches!(
            result,
            Err(IdParseError::InvalidChar { found: ' ', .. })
        ));
    }

    #[test]
    fn markup_characters_rejected() {
        let result: Result<PhaseId, _> = "P<1>".parse();
        assert!(matches!(result, Err(IdParseError::InvalidChar { .. })));
    }

    #[test]
    fn epic_id_generate() {
        let id = EpicId::generate();
        assert!(id.as_str().starts_with("epic_"));
        assert_eq!(id.ulid_part().len(), 26);
    }

    #[test]
    fn event_id_is_zero_padded() {
        assert_eq!(EventId::sequenced(7).as_str(), "evt_0007");
        assert_eq!(EventId::sequenced(12345).as_str(), "evt_12345");
    }

    #[test]
    fn id_serde_is_transparent() {
        let id: TaskId = "T1".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"T1\"");
        let parsed: TaskId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }
}
