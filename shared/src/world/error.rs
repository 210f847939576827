use thiserror::Error;

use snapsync_serde::SerdeErr;

use crate::{
    types::{ArchetypeHash, ClientId, ObjectId, Tick},
    variables::VariableError,
};

/// Errors that can occur when updating the ownership table
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OwnershipError {
    /// The object is already listed under this client
    #[error("Object {object_id} is already owned by client {client}")]
    AlreadyOwned { object_id: ObjectId, client: ClientId },

    /// The object is not listed under this client
    #[error("Object {object_id} is not owned by client {client}")]
    NotOwned { object_id: ObjectId, client: ClientId },
}

/// Errors that can occur when spawning, despawning, showing, hiding,
/// reparenting or transferring objects
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectError {
    /// A server-only operation was called on a client
    #[error("Only the server can {operation}")]
    NotServer { operation: &'static str },

    /// No object with this id exists locally
    #[error("Object {object_id} does not exist")]
    ObjectNotFound { object_id: ObjectId },

    /// The object exists but is not spawned yet
    #[error("Object {object_id} is not spawned")]
    NotSpawned { object_id: ObjectId },

    /// An object with this id is already spawned
    #[error("Object {object_id} is already spawned")]
    AlreadySpawned { object_id: ObjectId },

    /// The id was despawned during the current tick and cannot be reused until the next one
    #[error("Object {object_id} was despawned at tick {tick} and cannot be respawned in the same tick")]
    RespawnInSameTick { object_id: ObjectId, tick: Tick },

    /// No factory is registered for this archetype
    #[error("No archetype registered for hash {archetype:#010x}")]
    UnknownArchetype { archetype: ArchetypeHash },

    /// A factory is already registered for this archetype
    #[error("Archetype {archetype:#010x} is already registered")]
    DuplicateArchetype { archetype: ArchetypeHash },

    /// The client already observes, or is about to observe, the object
    #[error("Object {object_id} is already visible to client {client}")]
    AlreadyVisible { object_id: ObjectId, client: ClientId },

    /// The client does not observe the object
    #[error("Object {object_id} is already hidden from client {client}")]
    AlreadyHidden { object_id: ObjectId, client: ClientId },

    /// The server always sees every object
    #[error("Cannot hide object {object_id} from the server")]
    CannotHideFromServer { object_id: ObjectId },

    /// The requested parent is not a spawned object
    #[error("Cannot parent object {object_id} to {parent}, which is not spawned")]
    ParentNotSpawned { object_id: ObjectId, parent: ObjectId },

    /// The requested parent is the object itself or one of its descendants
    #[error("Parenting object {object_id} to {parent} would create a cycle")]
    CyclicParent { object_id: ObjectId, parent: ObjectId },

    /// The client already has a player object
    #[error("Client {client} already has player object {object_id}")]
    PlayerObjectExists { client: ClientId, object_id: ObjectId },

    /// The ownership index disagreed with the directory
    #[error(transparent)]
    Ownership(#[from] OwnershipError),

    /// Variable state could not be written or read
    #[error(transparent)]
    Variables(#[from] VariableError),

    /// An object message could not be decoded
    #[error("Malformed object message: {0}")]
    Serde(#[from] SerdeErr),
}
