//! # talento-shared
//!
//! Domain types, the backend-neutral record/query model and the collaborator
//! traits shared by the Talento store and client crates.

pub mod constants;
pub mod error;
pub mod models;
pub mod query;
pub mod scoring;
pub mod service;
pub mod types;

pub use error::ServiceError;
pub use query::{OrderBy, Predicate, Query, Record};
pub use types::{Actor, CardId, ChannelName, MessageId, Participant, ParticipantId, Role};
