use thiserror::Error;

use snapsync_serde::SerdeErr;

/// Errors that can occur while framing or routing messages
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The message is empty and carries no type id
    #[error("Received an empty message, no type id to dispatch on")]
    EmptyMessage,

    /// The type id falls in the reserved range
    #[error("Message type id {id} is reserved and cannot be used")]
    ReservedMessageType { id: u8 },

    /// Attempted to create a custom message type below the custom range
    #[error("Custom message type id {id} must be at least {first_custom}")]
    InvalidCustomMessageType { id: u8, first_custom: u8 },

    /// A handler for this type is already registered
    #[error("A handler for message type {message_type} is already registered")]
    DuplicateHandler { message_type: String },

    /// No handler was registered for this type
    #[error("No handler registered for message type {message_type}")]
    NoHandler { message_type: String },

    /// The payload could not be decoded
    #[error("Malformed message body: {0}")]
    Malformed(#[from] SerdeErr),
}
