//! Role-tagged content exchanged with the generative model and stored in
//! conversation transcripts.

use serde::{Deserialize, Serialize};

/// Author of a content turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The group member.
    User,
    /// The model.
    Model,
}

/// Base64 image data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineData {
    /// One of the supported image MIME types.
    pub mime_type: String,
    /// Base64 encoded bytes.
    pub data: String,
}

/// One part of a content turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    /// Plain text.
    Text { text: String },
    /// Inline image.
    InlineData { inline_data: InlineData },
}

impl Part {
    /// Text part.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Whether this part carries inline data.
    #[must_use]
    pub const fn is_inline_data(&self) -> bool {
        matches!(self, Self::InlineData { .. })
    }
}

/// An ordered list of parts, optionally tagged with a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    /// Role; absent for a one-shot prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Parts.
    pub parts: Vec<Part>,
}

impl Content {
    /// A user turn.
    #[must_use]
    pub const fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Some(Role::User),
            parts,
        }
    }

    /// A model turn with a single text part.
    #[must_use]
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Some(Role::Model),
            parts: vec![Part::text(text)],
        }
    }

    /// A prompt without a role.
    #[must_use]
    pub const fn prompt(parts: Vec<Part>) -> Self {
        Self { role: None, parts }
    }

    /// Whether any part carries inline data.
    #[must_use]
    pub fn has_inline_data(&self) -> bool {
        self.parts.iter().any(Part::is_inline_data)
    }
}

/// MIME types the vision model accepts.
#[must_use]
pub fn is_supported_mime_type(mime_type: &str) -> bool {
    matches!(
        mime_type,
        "image/png" | "image/jpeg" | "image/webp" | "image/heic" | "image/heif"
    )
}
