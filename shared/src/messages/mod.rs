pub mod connection_messages;
pub mod constants;
pub mod error;
pub mod message;
pub mod message_dispatch;
pub mod message_type;
pub mod object_messages;
pub mod outbox;
