//! Typed records exchanged with the collaborator services.
//!
//! Records travel as JSON objects; every struct here is the validated shape
//! of one resource and is converted at the boundary with [`from_record`] /
//! [`to_record`].

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::query::Record;
use crate::types::{CardId, MessageId, ParticipantId};

/// Decode a raw record into a typed model.
pub fn from_record<T: DeserializeOwned>(record: Record) -> Result<T, ServiceError> {
    if !record.is_object() {
        return Err(ServiceError::InvalidRecord(format!(
            "expected an object, got {record}"
        )));
    }
    Ok(serde_json::from_value(record)?)
}

/// Encode a typed model as a raw record.
pub fn to_record<T: Serialize>(value: &T) -> Result<Record, ServiceError> {
    Ok(serde_json::to_value(value)?)
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Audio,
    Document,
    File,
}

impl MessageKind {
    /// Guess the kind of an attachment from its MIME type.
    pub fn from_content_type(content_type: &str) -> Self {
        let lower = content_type.to_ascii_lowercase();
        if lower.starts_with("image/") {
            Self::Image
        } else if lower.starts_with("audio/") {
            Self::Audio
        } else if lower == "application/pdf"
            || lower.starts_with("text/")
            || lower.contains("word")
            || lower.contains("officedocument")
        {
            Self::Document
        } else {
            Self::File
        }
    }
}

/// A single chat message as persisted by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: ParticipantId,
    pub receiver_id: ParticipantId,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Conversation order: creation time, then id.
    pub fn conversation_order(&self, other: &Self) -> Ordering {
        self.created_at
            .cmp(&other.created_at)
            .then_with(|| self.id.cmp(&other.id))
    }

    /// Whether the message travels between `a` and `b`, in either direction.
    pub fn is_between(&self, a: &ParticipantId, b: &ParticipantId) -> bool {
        (&self.sender_id == a && &self.receiver_id == b)
            || (&self.sender_id == b && &self.receiver_id == a)
    }

    /// Short human readable preview used in notifications.
    pub fn preview(&self) -> String {
        match (&self.content, self.kind) {
            (Some(text), _) if !text.trim().is_empty() => text.clone(),
            (_, MessageKind::Image) => "📷 Immagine".to_string(),
            (_, MessageKind::Audio) => "🎤 Messaggio vocale".to_string(),
            (_, MessageKind::Document) => "📄 Documento".to_string(),
            _ => "📎 Allegato".to_string(),
        }
    }
}

/// Insert payload for a new message. `id` and `created_at` are assigned by
/// the persistence layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: ParticipantId,
    pub receiver_id: ParticipantId,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub kind: MessageKind,
    pub read: bool,
}

// ---------------------------------------------------------------------------
// Swipe cards
// ---------------------------------------------------------------------------

/// A published job offer as seen by a candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobOfferCard {
    pub id: CardId,
    pub title: String,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub experience_level: Option<String>,
    #[serde(default)]
    pub core_values: Vec<String>,
}

/// A candidate profile as seen by a recruiter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandidateCard {
    pub id: CardId,
    pub full_name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub trs_score: Option<u32>,
    #[serde(default)]
    pub core_values: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SwipeCard {
    JobOffer(JobOfferCard),
    Candidate(CandidateCard),
}

impl SwipeCard {
    pub fn id(&self) -> &CardId {
        match self {
            Self::JobOffer(offer) => &offer.id,
            Self::Candidate(candidate) => &candidate.id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::JobOffer(offer) => &offer.title,
            Self::Candidate(candidate) => &candidate.full_name,
        }
    }

    pub fn location(&self) -> Option<&str> {
        match self {
            Self::JobOffer(offer) => offer.location.as_deref(),
            Self::Candidate(candidate) => candidate.location.as_deref(),
        }
    }

    /// Tag-like attributes shown on the card face.
    pub fn tags(&self) -> Vec<String> {
        match self {
            Self::JobOffer(offer) => offer
                .sector
                .iter()
                .chain(offer.experience_level.iter())
                .cloned()
                .collect(),
            Self::Candidate(candidate) => {
                let mut tags = candidate.skills.clone();
                if let Some(score) = candidate.trs_score {
                    tags.push(format!("TRS {score}"));
                }
                tags
            }
        }
    }

    pub fn core_values(&self) -> &[String] {
        match self {
            Self::JobOffer(offer) => &offer.core_values,
            Self::Candidate(candidate) => &candidate.core_values,
        }
    }
}

/// Swipe queue filters. Blank strings count as absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SwipeFilters {
    pub city: Option<String>,
    pub sector: Option<String>,
    pub min_score: Option<u32>,
}

impl SwipeFilters {
    pub fn city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    pub fn sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = Some(sector.into());
        self
    }

    pub fn min_score(mut self, score: u32) -> Self {
        self.min_score = Some(score);
        self
    }

    /// Trim values and drop the blank ones.
    pub fn normalized(&self) -> Self {
        fn clean(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        }
        Self {
            city: clean(&self.city),
            sector: clean(&self.sector),
            min_score: self.min_score,
        }
    }
}

// ---------------------------------------------------------------------------
// Interactions & notifications
// ---------------------------------------------------------------------------

/// Candidate -> job offer match created by a right swipe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchRecord {
    pub candidate_id: ParticipantId,
    pub job_offer_id: CardId,
}

/// Recruiter -> candidate favorite created by a right swipe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FavoriteRecord {
    pub recruiter_id: ParticipantId,
    pub candidate_id: CardId,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    #[default]
    Message,
    Match,
}

/// Insert payload for a notification center entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewNotification {
    pub user_id: ParticipantId,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    /// Deep-link target, the sender id for message notifications.
    pub link: Option<String>,
    pub read: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub id: String,
    pub user_id: ParticipantId,
    #[serde(default)]
    pub kind: NotificationKind,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}
