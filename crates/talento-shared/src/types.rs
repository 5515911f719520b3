use serde::{Deserialize, Serialize};

use crate::constants::{CHANNEL_PREFIX, CHANNEL_SEPARATOR};

// Participant identity = opaque id issued by the auth provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a job offer or candidate profile shown in the swipe queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct CardId(pub String);

impl CardId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CardId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A participant as shown in a conversation header.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
}

impl Participant {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: ParticipantId::new(id),
            display_name: display_name.into(),
        }
    }
}

/// Deterministic realtime channel name shared by every member of a
/// conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ChannelName(String);

impl ChannelName {
    /// Name of the one-to-one channel between `a` and `b`. Symmetric in its
    /// arguments.
    pub fn for_pair(a: &ParticipantId, b: &ParticipantId) -> Self {
        Self::for_members([a, b])
    }

    /// Name of a channel shared by any number of members. Member order and
    /// repetitions do not affect the result.
    pub fn for_members<'a>(members: impl IntoIterator<Item = &'a ParticipantId>) -> Self {
        let mut ids: Vec<&str> = members.into_iter().map(ParticipantId::as_str).collect();
        ids.sort_unstable();
        ids.dedup();
        Self(format!("{CHANNEL_PREFIX}:{}", ids.join(CHANNEL_SEPARATOR)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Candidate,
    Recruiter,
}

/// The user driving the swipe interface. The variant decides which
/// collection is browsed and which record an accept produces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Actor {
    Candidate(ParticipantId),
    Recruiter(ParticipantId),
}

impl Actor {
    pub fn id(&self) -> &ParticipantId {
        match self {
            Self::Candidate(id) | Self::Recruiter(id) => id,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Self::Candidate(_) => Role::Candidate,
            Self::Recruiter(_) => Role::Recruiter,
        }
    }
}
