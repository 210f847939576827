// Message type id ranges

/// Highest id used by the replication core itself
pub const LAST_INTERNAL_MESSAGE_ID: u8 = 7;

/// User message ids start here, everything in between is reserved
pub const FIRST_CUSTOM_MESSAGE_ID: u8 = 32;
