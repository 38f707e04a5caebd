//! Conversation persistence as per-client append-only message logs.

pub mod file;
pub mod traits;

pub use file::FileConversationStore;
pub use traits::{ConversationStore, Direction, MessageRecord, parse_timestamp};
