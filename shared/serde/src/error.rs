use thiserror::Error;

/// Errors that can occur while encoding or decoding bytes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerdeErr {
    /// Attempted to read past the end of the buffer
    #[error("Unexpected end of buffer: needed {needed} bytes but only {remaining} remain")]
    UnexpectedEnd { needed: usize, remaining: usize },

    /// A bounded writer was asked to hold more bytes than its limit
    #[error("Writer capacity exceeded: attempted {attempted} bytes with a limit of {limit}")]
    CapacityExceeded { attempted: usize, limit: usize },

    /// The bytes read do not describe a valid value of the expected type
    #[error("Invalid value for {type_name}: {detail}")]
    InvalidValue {
        type_name: &'static str,
        detail: String,
    },

    /// Attempted to move the read cursor outside of the buffer
    #[error("Cannot seek to position {position} in a buffer of {length} bytes")]
    SeekOutOfBounds { position: usize, length: usize },
}
