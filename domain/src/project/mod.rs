//! Project domain module
//!
//! The project aggregate, its append-only conversation history and the
//! read-only snapshot handed to every stage.

pub mod conversation;
pub mod entities;
pub mod image;
pub mod snapshot;

pub use conversation::{ConversationHistory, ConversationTurn, TurnOrigin, TurnRole};
pub use entities::{InteractionMode, Project, ProjectId};
pub use image::{ImageAttachment, MAX_IMAGE_BYTES};
pub use snapshot::{FileWrite, ProjectSnapshot};
