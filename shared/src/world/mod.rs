mod archetype;
mod error;
mod network_object;
mod object_directory;
mod ownership_table;

pub use archetype::{archetype_hash, ArchetypeRegistry, BehaviourFactory};
pub use error::{ObjectError, OwnershipError};
pub use network_object::{NetworkObject, SpawnParams, SpawnState, VisibilityFn};
pub use object_directory::{ObjectDirectory, ObjectEvent, ReplicationContext, SpawnDelivery};
pub use ownership_table::OwnershipTable;
