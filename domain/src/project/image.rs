//! Images attached to user messages

use crate::core::error::DomainError;
use std::fmt;

/// Largest image accepted as an attachment
pub const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

/// An image sent alongside a user message.
///
/// Providers receive the raw bytes and encode them for their own wire
/// format; the conversation history keeps only [`name`](Self::name).
#[derive(Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub name: String,
    pub media_type: String,
    pub data: Vec<u8>,
}

impl ImageAttachment {
    /// Build an attachment, taking the media type from the file extension
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Result<Self, DomainError> {
        let name = name.into();
        let ext = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        let media_type = media_type_for(&ext)
            .ok_or_else(|| DomainError::InvalidAttachment(format!("unsupported image type '{}'", name)))?;
        if data.is_empty() {
            return Err(DomainError::InvalidAttachment(format!("{} is empty", name)));
        }
        if data.len() > MAX_IMAGE_BYTES {
            return Err(DomainError::InvalidAttachment(format!(
                "{} is {} bytes (max {})",
                name,
                data.len(),
                MAX_IMAGE_BYTES
            )));
        }
        Ok(Self {
            name,
            media_type: media_type.to_string(),
            data,
        })
    }
}

// Keeps image bytes out of logs and test failure output
impl fmt::Debug for ImageAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageAttachment")
            .field("name", &self.name)
            .field("media_type", &self.media_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

fn media_type_for(ext: &str) -> Option<&'static str> {
    match ext {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}
