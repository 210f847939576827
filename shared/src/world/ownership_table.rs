use std::collections::{HashMap, HashSet};

use crate::{
    types::{ClientId, ObjectId},
    world::error::OwnershipError,
};

/// Index of which objects each client owns. Derived from the directory,
/// used for authority checks and cleanup on disconnect.
pub struct OwnershipTable {
    owned: HashMap<ClientId, HashSet<ObjectId>>,
}

impl OwnershipTable {
    pub fn new() -> Self {
        Self {
            owned: HashMap::new(),
        }
    }

    /// Lists `object_id` under `client`
    ///
    /// # Panics
    ///
    /// Panics if the object is already listed under the client.
    /// Consider using `try_add` for non-panicking error handling.
    pub fn add(&mut self, client: ClientId, object_id: ObjectId) {
        self.try_add(client, object_id)
            .expect("an object cannot be owned twice by the same client")
    }

    /// Lists `object_id` under `client`
    ///
    /// Returns an error if the object is already listed under the client.
    pub fn try_add(&mut self, client: ClientId, object_id: ObjectId) -> Result<(), OwnershipError> {
        if !self.owned.entry(client).or_default().insert(object_id) {
            return Err(OwnershipError::AlreadyOwned { object_id, client });
        }
        Ok(())
    }

    /// Removes `object_id` from `client`'s list
    ///
    /// # Panics
    ///
    /// Panics if the object is not listed under the client.
    /// Consider using `try_remove` for non-panicking error handling.
    pub fn remove(&mut self, client: ClientId, object_id: ObjectId) {
        self.try_remove(client, object_id)
            .expect("an object must be owned by a client before it can be removed from it")
    }

    /// Removes `object_id` from `client`'s list
    ///
    /// Returns an error if the object is not listed under the client.
    pub fn try_remove(&mut self, client: ClientId, object_id: ObjectId) -> Result<(), OwnershipError> {
        let Some(objects) = self.owned.get_mut(&client) else {
            return Err(OwnershipError::NotOwned { object_id, client });
        };
        if !objects.remove(&object_id) {
            return Err(OwnershipError::NotOwned { object_id, client });
        }
        if objects.is_empty() {
            self.owned.remove(&client);
        }
        Ok(())
    }

    /// Moves `object_id` from `from` to `to`. Nothing changes on error.
    pub fn try_transfer(
        &mut self,
        object_id: ObjectId,
        from: ClientId,
        to: ClientId,
    ) -> Result<(), OwnershipError> {
        if from == to {
            return Ok(());
        }
        if self.owns(to, object_id) {
            return Err(OwnershipError::AlreadyOwned { object_id, client: to });
        }
        self.try_remove(from, object_id)?;
        self.try_add(to, object_id)
    }

    pub fn owns(&self, client: ClientId, object_id: ObjectId) -> bool {
        self.owned
            .get(&client)
            .is_some_and(|objects| objects.contains(&object_id))
    }

    /// Objects owned by `client`, in ascending id order
    pub fn owned_by(&self, client: ClientId) -> Vec<ObjectId> {
        let mut objects: Vec<ObjectId> = self
            .owned
            .get(&client)
            .map(|objects| objects.iter().copied().collect())
            .unwrap_or_default();
        objects.sort_unstable();
        objects
    }

    pub fn count(&self, client: ClientId) -> usize {
        self.owned.get(&client).map_or(0, HashSet::len)
    }

    pub fn clear(&mut self) {
        self.owned.clear();
    }
}

impl Default for OwnershipTable {
    fn default() -> Self {
        Self::new()
    }
}
