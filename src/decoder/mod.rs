//! Savegame decoding.
//!
//! The scanner only depends on the [`SaveDecoder`] trait. [`GamebryoDecoder`]
//! is the implementation used by the CLI; tests plug in their own.

mod error;
mod gamebryo;

pub use error::{DecodeError, is_lock_error};
pub use gamebryo::GamebryoDecoder;

use std::path::Path;

use async_trait::async_trait;

use crate::types::SaveMetadata;

/// Turns a save file into structured metadata.
#[async_trait]
pub trait SaveDecoder: Send + Sync {
    /// Decode the save at `path`.
    ///
    /// Must return [`DecodeError::Locked`] when the file is held open by
    /// another process so callers can retry.
    async fn decode(&self, path: &Path) -> Result<SaveMetadata, DecodeError>;
}
