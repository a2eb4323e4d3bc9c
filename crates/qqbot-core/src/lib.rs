//! Core abstractions for the QQ group bot.
//!
//! This crate provides the fundamental building blocks:
//! - `InboundEvent` / `Opcode` - Decoded gateway frames
//! - `SessionIdentity` / `ResumeToken` - State carried across reconnects
//! - `Credentials` / `Secret` - Rotatable secrets with an explicit owner
//! - `Content` / `Part` - Role-tagged generative content
//! - Transport, handler and collaborator traits

pub mod content;
pub mod credentials;
pub mod event;
pub mod session;
pub mod traits;

pub use content::{Content, InlineData, Part, Role, is_supported_mime_type};
pub use credentials::{Credentials, Secret};
pub use event::{InboundEvent, Opcode};
pub use session::{ResumeToken, SessionIdentity};
pub use traits::{
    Connector, ContentGenerator, ConversationStore, EventHandler, FrameHalves, FrameSink,
    FrameSource, ImageFetcher, Reply, ReplySender, SendStatus,
};
