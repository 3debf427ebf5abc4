//! Relation and event type identifiers
//!
//! Relation types and event types are open sets: new ones appear without any
//! server change, so they are plain string newtypes rather than enums. The
//! few literals the server itself cares about are exposed as constants.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{ErrorKind, MatrixonError};

/// The type of a relation between a child event and its parent, e.g.
/// `m.annotation`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationType(String);

impl RelationType {
    /// Relations that aggregate by key, such as reactions
    pub const ANNOTATION: &'static str = "m.annotation";
    /// Plain references to an earlier event
    pub const REFERENCE: &'static str = "m.reference";
    /// Replacement of an earlier event
    pub const REPLACES: &'static str = "m.replaces";

    pub fn new(relation_type: impl Into<String>) -> Self {
        Self(relation_type.into())
    }

    pub fn annotation() -> Self {
        Self::new(Self::ANNOTATION)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_annotation(&self) -> bool {
        self.0 == Self::ANNOTATION
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RelationType {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RelationType {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl AsRef<str> for RelationType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The type of an event, e.g. `m.reaction`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(String);

impl EventType {
    pub const ROOM_MEMBER: &'static str = "m.room.member";
    pub const ROOM_HISTORY_VISIBILITY: &'static str = "m.room.history_visibility";
    pub const REACTION: &'static str = "m.reaction";

    pub fn new(event_type: impl Into<String>) -> Self {
        Self(event_type.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Membership events change room state and are never sent as relations
    pub fn is_membership(&self) -> bool {
        self.0 == Self::ROOM_MEMBER
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for EventType {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl AsRef<str> for EventType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Pagination direction over the (topological, stream) ordering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Oldest first
    #[serde(rename = "f")]
    Forward,
    /// Newest first
    #[default]
    #[serde(rename = "b")]
    Backward,
}

impl FromStr for Direction {
    type Err = MatrixonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "f" => Ok(Direction::Forward),
            "b" => Ok(Direction::Backward),
            other => Err(MatrixonError::bad_request(
                ErrorKind::InvalidParam,
                format!("Unknown direction: {other}"),
            )),
        }
    }
}
