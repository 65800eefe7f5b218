//! Content-addressed asset storage for pipeline media.
//!
//! Intermediate and final media live in an R2 bucket under a per-job
//! prefix. Reads by external consumers (the video model fetching a start
//! image, the player fetching the final video) go through short-lived
//! presigned URLs.

pub mod client;
pub mod error;
pub mod layout;

pub use client::{AssetStore, AssetStoreConfig, MAX_SIGNED_URL_TTL};
pub use error::{StorageError, StorageResult};
