pub mod message;
pub mod store;

pub use message::{Attachment, Message};
pub use store::{InboxError, InboxStore, MemoryInbox};
