use std::collections::HashMap;

use snapsync_serde::ByteReader;

use crate::{
    messages::{error::DispatchError, message_type::MessageType},
    types::ClientId,
};

/// Handler invoked for one inbound message. `C` is the context the handler
/// mutates, `E` its error type.
pub type MessageHandler<C, E> = fn(&mut C, ClientId, &mut ByteReader) -> Result<(), E>;

/// Routes inbound messages to the handler registered for their type id
pub struct MessageDispatch<C, E> {
    handlers: HashMap<MessageType, MessageHandler<C, E>>,
}

impl<C, E: From<DispatchError>> MessageDispatch<C, E> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register the handler for a message type
    ///
    /// Returns an error if a handler for that type already exists.
    pub fn try_register(
        &mut self,
        message_type: MessageType,
        handler: MessageHandler<C, E>,
    ) -> Result<(), DispatchError> {
        if self.handlers.contains_key(&message_type) {
            return Err(DispatchError::DuplicateHandler {
                message_type: message_type.to_string(),
            });
        }
        self.handlers.insert(message_type, handler);
        Ok(())
    }

    /// Register the handler for a message type
    ///
    /// # Panics
    ///
    /// Panics if a handler for that type is already registered.
    /// Consider using `try_register` for non-panicking error handling.
    pub fn register(&mut self, message_type: MessageType, handler: MessageHandler<C, E>) {
        self.try_register(message_type, handler)
            .expect("a message type can only have one handler")
    }

    pub fn handler(&self, message_type: &MessageType) -> Option<MessageHandler<C, E>> {
        self.handlers.get(message_type).copied()
    }

    pub fn has_handler(&self, message_type: &MessageType) -> bool {
        self.handlers.contains_key(message_type)
    }

    /// Splits a framed message into its type and a reader over the body
    pub fn read_frame(bytes: &[u8]) -> Result<(MessageType, ByteReader<'_>), DispatchError> {
        let Some((id, body)) = bytes.split_first() else {
            return Err(DispatchError::EmptyMessage);
        };
        let message_type = MessageType::try_from_id(*id)?;
        Ok((message_type, ByteReader::new(body)))
    }

    /// Looks up the handler for a framed message and runs it against `context`
    pub fn dispatch(&self, context: &mut C, sender: ClientId, bytes: &[u8]) -> Result<(), E> {
        let (message_type, mut reader) = Self::read_frame(bytes)?;
        let Some(handler) = self.handler(&message_type) else {
            return Err(DispatchError::NoHandler {
                message_type: message_type.to_string(),
            }
            .into());
        };
        handler(context, sender, &mut reader)
    }
}

impl<C, E: From<DispatchError>> Default for MessageDispatch<C, E> {
    fn default() -> Self {
        Self::new()
    }
}
