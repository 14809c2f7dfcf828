pub mod types;

pub use types::{Message, MessageKind, SystemNotice, TaggedMessage, SERVER_NAME};
