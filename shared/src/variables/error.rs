use thiserror::Error;

use snapsync_serde::SerdeErr;

use crate::types::{ClientId, ObjectId};

/// Errors that can occur while writing or reading variable data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VariableError {
    /// A field encoded to more bytes than its length prefix can describe
    #[error("Field encoded to {length} bytes, more than a u16 length prefix allows")]
    FieldTooLarge { length: usize },

    /// An object has more behaviours than a delta can address
    #[error("Behaviour index {index} of object {object_id} does not fit in a u16")]
    TooManyBehaviours { object_id: ObjectId, index: usize },

    /// A delta addressed a behaviour the object does not have
    #[error("Object {object_id} has {count} behaviours, cannot address behaviour {index}")]
    BehaviourOutOfRange {
        object_id: ObjectId,
        index: u16,
        count: usize,
    },

    /// A full state listed a different number of behaviours than the object has
    #[error("Object {object_id} has {expected} behaviours but its state lists {found}")]
    BehaviourCountMismatch {
        object_id: ObjectId,
        expected: usize,
        found: usize,
    },

    /// A client wrote a field it has no permission to write. Without length
    /// prefixes the rest of the message cannot be located.
    #[error("Client {sender} may not write field {field_index} of object {object_id}")]
    UnauthorizedWrite {
        object_id: ObjectId,
        field_index: usize,
        sender: ClientId,
    },

    /// The underlying bytes could not be read or written
    #[error("Malformed variable data: {0}")]
    Serde(#[from] SerdeErr),
}
