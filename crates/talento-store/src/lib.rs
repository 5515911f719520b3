//! # talento-store
//!
//! Local persistence for the Talento client, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle with typed helpers for
//! JSON records, device settings and blob metadata, and a [`LocalBackend`]
//! that implements every collaborator service on top of it: record queries,
//! realtime change fan-out, filesystem blob storage and key/value settings.

pub mod backend;
pub mod blob_store;
pub mod blobs;
pub mod database;
pub mod migrations;
pub mod models;
pub mod realtime;
pub mod records;
pub mod settings;

mod error;

pub use backend::LocalBackend;
pub use blob_store::LocalBlobStore;
pub use database::Database;
pub use error::StoreError;
pub use models::*;
