use std::fmt;

use crate::messages::{
    constants::{FIRST_CUSTOM_MESSAGE_ID, LAST_INTERNAL_MESSAGE_ID},
    error::DispatchError,
};

/// Wire-level identifier that selects the handler for a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    ConnectionRequest,
    ConnectionApproved,
    Snapshot,
    CreateObject,
    DestroyObject,
    ChangeOwnership,
    ParentSync,
    VariableDelta,
    Custom(u8),
}

impl MessageType {
    /// Creates a user message type, ids below the custom range are rejected
    pub fn custom(id: u8) -> Result<Self, DispatchError> {
        if id < FIRST_CUSTOM_MESSAGE_ID {
            return Err(DispatchError::InvalidCustomMessageType {
                id,
                first_custom: FIRST_CUSTOM_MESSAGE_ID,
            });
        }
        Ok(MessageType::Custom(id))
    }

    pub fn id(&self) -> u8 {
        match self {
            MessageType::ConnectionRequest => 0,
            MessageType::ConnectionApproved => 1,
            MessageType::Snapshot => 2,
            MessageType::CreateObject => 3,
            MessageType::DestroyObject => 4,
            MessageType::ChangeOwnership => 5,
            MessageType::ParentSync => 6,
            MessageType::VariableDelta => 7,
            MessageType::Custom(id) => *id,
        }
    }

    pub fn try_from_id(id: u8) -> Result<Self, DispatchError> {
        let message_type = match id {
            0 => MessageType::ConnectionRequest,
            1 => MessageType::ConnectionApproved,
            2 => MessageType::Snapshot,
            3 => MessageType::CreateObject,
            4 => MessageType::DestroyObject,
            5 => MessageType::ChangeOwnership,
            6 => MessageType::ParentSync,
            7 => MessageType::VariableDelta,
            id if id > LAST_INTERNAL_MESSAGE_ID && id < FIRST_CUSTOM_MESSAGE_ID => {
                return Err(DispatchError::ReservedMessageType { id });
            }
            id => MessageType::Custom(id),
        };
        Ok(message_type)
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, MessageType::Custom(_))
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Custom(id) => write!(f, "Custom({})", id),
            other => write!(f, "{:?}", other),
        }
    }
}
