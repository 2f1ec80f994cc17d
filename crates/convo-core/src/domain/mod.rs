//! Domain entities

pub mod active;
pub mod message;
pub mod snapshot;

pub use active::{ActiveConversation, ConversationView};
pub use message::{
    ChatMessage, Citation, FunctionCall, MessageCompletion, MessageStatus, OpaqueValue, ToolResult,
};
pub use snapshot::ConversationSnapshot;
