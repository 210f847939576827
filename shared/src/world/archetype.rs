use std::collections::HashMap;

use crate::{types::ArchetypeHash, variables::Replicate, world::error::ObjectError};

/// Builds the behaviours of a freshly instantiated object
pub type BehaviourFactory = fn() -> Vec<Box<dyn Replicate>>;

/// Stable 32-bit FNV-1a hash of an archetype name
pub const fn archetype_hash(name: &str) -> ArchetypeHash {
    let bytes = name.as_bytes();
    let mut hash: u32 = 0x811c_9dc5;
    let mut index = 0;
    while index < bytes.len() {
        hash ^= bytes[index] as u32;
        hash = hash.wrapping_mul(0x0100_0193);
        index += 1;
    }
    hash
}

/// Maps archetype hashes to the factories peers use to materialise objects.
/// Every peer must register the same archetypes.
#[derive(Clone, Default)]
pub struct ArchetypeRegistry {
    factories: HashMap<ArchetypeHash, BehaviourFactory>,
}

impl ArchetypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Panics
    ///
    /// Panics if the archetype is already registered.
    /// Consider using `try_register` for non-panicking error handling.
    pub fn register(&mut self, archetype: ArchetypeHash, factory: BehaviourFactory) {
        self.try_register(archetype, factory)
            .expect("an archetype can only be registered once")
    }

    pub fn try_register(
        &mut self,
        archetype: ArchetypeHash,
        factory: BehaviourFactory,
    ) -> Result<(), ObjectError> {
        if self.factories.contains_key(&archetype) {
            return Err(ObjectError::DuplicateArchetype { archetype });
        }
        self.factories.insert(archetype, factory);
        Ok(())
    }

    pub fn contains(&self, archetype: ArchetypeHash) -> bool {
        self.factories.contains_key(&archetype)
    }

    pub fn instantiate(&self, archetype: ArchetypeHash) -> Result<Vec<Box<dyn Replicate>>, ObjectError> {
        let factory = self
            .factories
            .get(&archetype)
            .ok_or(ObjectError::UnknownArchetype { archetype })?;
        Ok(factory())
    }
}
