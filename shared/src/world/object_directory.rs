use std::collections::{HashMap, HashSet};

use log::{debug, warn};

use snapsync_serde::{ByteReader, ByteWriter, Serde};

use crate::{
    messages::{
        message_type::MessageType,
        object_messages::{ChangeOwnershipMessage, DestroyObjectMessage, ParentSyncMessage},
        outbox::Outbox,
    },
    snapshot::{DespawnCommand, SnapshotApplier, SnapshotEngine, SpawnCommand, Targets},
    transport::DeliveryClass,
    types::{ArchetypeHash, ClientId, HostType, ObjectId, Tick, Transform, SERVER_CLIENT_ID},
    variables::{DeltaScope, ReadScope, VariableDeltaHeader, VariableError, VariableReplicator},
    world::{
        archetype::ArchetypeRegistry,
        error::ObjectError,
        network_object::{NetworkObject, PendingObserver, SpawnParams, SpawnState},
        ownership_table::OwnershipTable,
    },
};

/// How spawns and despawns reach clients. A session uses exactly one path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SpawnDelivery {
    /// Tick-stamped commands resent in every snapshot until acknowledged
    #[default]
    Snapshot,
    /// One reliable create or destroy message per observer
    DirectMessage,
}

/// Something that happened to a local object
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectEvent {
    Spawned { object_id: ObjectId, archetype: ArchetypeHash },
    Despawned { object_id: ObjectId },
    GainedOwnership { object_id: ObjectId },
    LostOwnership { object_id: ObjectId },
    ParentChanged { object_id: ObjectId, parent: Option<ObjectId> },
}

/// The collaborators a directory operation needs to tell peers about it
pub struct ReplicationContext<'a> {
    pub snapshot: &'a mut SnapshotEngine,
    pub replicator: &'a VariableReplicator,
    pub outbox: &'a mut Outbox,
    pub delivery: SpawnDelivery,
}

/// The authoritative (server) or mirrored (client) table of live objects,
/// their parenting and who observes them
pub struct ObjectDirectory {
    host_type: HostType,
    local_client: ClientId,
    archetypes: ArchetypeRegistry,
    objects: HashMap<ObjectId, NetworkObject>,
    persisted: HashMap<ObjectId, NetworkObject>,
    orphans: HashSet<ObjectId>,
    ownership: OwnershipTable,
    player_objects: HashMap<ClientId, ObjectId>,
    next_object_id: ObjectId,
    despawned_at: HashMap<ObjectId, Tick>,
    hidden_at: HashMap<(ObjectId, ClientId), Tick>,
    deferred_shows: Vec<(ObjectId, ClientId)>,
    events: Vec<ObjectEvent>,
}

impl ObjectDirectory {
    pub fn new(host_type: HostType, archetypes: ArchetypeRegistry) -> Self {
        Self {
            host_type,
            local_client: SERVER_CLIENT_ID,
            archetypes,
            objects: HashMap::new(),
            persisted: HashMap::new(),
            orphans: HashSet::new(),
            ownership: OwnershipTable::new(),
            player_objects: HashMap::new(),
            next_object_id: 1,
            despawned_at: HashMap::new(),
            hidden_at: HashMap::new(),
            deferred_shows: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn host_type(&self) -> HostType {
        self.host_type
    }

    pub fn local_client(&self) -> ClientId {
        self.local_client
    }

    /// Set once a client learns its id from the server
    pub fn set_local_client(&mut self, client: ClientId) {
        self.local_client = client;
    }

    pub fn archetypes(&self) -> &ArchetypeRegistry {
        &self.archetypes
    }

    fn ensure_server(&self, operation: &'static str) -> Result<(), ObjectError> {
        if self.host_type != HostType::Server {
            return Err(ObjectError::NotServer { operation });
        }
        Ok(())
    }

    fn spawned(&self, object_id: ObjectId) -> Result<&NetworkObject, ObjectError> {
        let object = self
            .objects
            .get(&object_id)
            .ok_or(ObjectError::ObjectNotFound { object_id })?;
        if !object.is_spawned() {
            return Err(ObjectError::NotSpawned { object_id });
        }
        Ok(object)
    }

    fn spawned_mut(&mut self, object_id: ObjectId) -> Result<&mut NetworkObject, ObjectError> {
        let object = self
            .objects
            .get_mut(&object_id)
            .ok_or(ObjectError::ObjectNotFound { object_id })?;
        if !object.is_spawned() {
            return Err(ObjectError::NotSpawned { object_id });
        }
        Ok(object)
    }

    fn allocate_id(&mut self) -> ObjectId {
        while self.objects.contains_key(&self.next_object_id) {
            self.next_object_id += 1;
        }
        let object_id = self.next_object_id;
        self.next_object_id += 1;
        object_id
    }

    // Spawning

    /// Spawns an object and issues its spawn to every connected client the
    /// object is visible to
    ///
    /// # Panics
    ///
    /// Panics if called on a client or if the parameters are invalid.
    /// Consider using `try_spawn` for non-panicking error handling.
    pub fn spawn(
        &mut self,
        params: SpawnParams,
        connected: &[ClientId],
        ctx: &mut ReplicationContext,
    ) -> ObjectId {
        match self.try_spawn(params, connected, ctx) {
            Ok(object_id) => object_id,
            Err(error) => panic!("Cannot spawn object: {}", error),
        }
    }

    /// Spawns an object and issues its spawn to every connected client the
    /// object is visible to
    ///
    /// Returns an error if called on a client, if the id, parent, archetype
    /// or player object constraint is violated.
    pub fn try_spawn(
        &mut self,
        params: SpawnParams,
        connected: &[ClientId],
        ctx: &mut ReplicationContext,
    ) -> Result<ObjectId, ObjectError> {
        self.ensure_server("spawn objects")?;

        let object_id = match params.object_id {
            Some(object_id) => object_id,
            None => self.allocate_id(),
        };
        if self.objects.contains_key(&object_id) {
            return Err(ObjectError::AlreadySpawned { object_id });
        }
        let tick = ctx.snapshot.current_tick();
        if self.despawned_at.get(&object_id) == Some(&tick) {
            return Err(ObjectError::RespawnInSameTick { object_id, tick });
        }
        if let Some(parent) = params.parent {
            if !self.is_spawned(parent) {
                return Err(ObjectError::ParentNotSpawned { object_id, parent });
            }
        }
        if params.is_player_object {
            if let Some(existing) = self.player_objects.get(&params.owner) {
                return Err(ObjectError::PlayerObjectExists {
                    client: params.owner,
                    object_id: *existing,
                });
            }
        }
        let behaviours = self.archetypes.instantiate(params.archetype)?;
        self.ownership.try_add(params.owner, object_id)?;

        let object = NetworkObject::from_params(object_id, params, behaviours);
        if object.is_player_object {
            self.player_objects.insert(object.owner, object_id);
        }
        let targets: Vec<ClientId> = connected
            .iter()
            .copied()
            .filter(|client| *client != SERVER_CLIENT_ID && object.is_visible_to(*client))
            .collect();
        self.events.push(ObjectEvent::Spawned {
            object_id,
            archetype: object.archetype,
        });
        self.objects.insert(object_id, object);

        for client in targets {
            self.issue_spawn(object_id, client, ctx)?;
        }
        debug!("spawned object {} at tick {}", object_id, tick);
        Ok(object_id)
    }

    fn issue_spawn(
        &mut self,
        object_id: ObjectId,
        client: ClientId,
        ctx: &mut ReplicationContext,
    ) -> Result<(), ObjectError> {
        let object = self
            .objects
            .get_mut(&object_id)
            .ok_or(ObjectError::ObjectNotFound { object_id })?;
        let tick = ctx.snapshot.current_tick();
        let mut command = object.spawn_command();

        match ctx.delivery {
            SpawnDelivery::Snapshot => {
                ctx.snapshot
                    .record_spawn(command, Targets::single(client), &[]);
                object.pending_observers.insert(
                    client,
                    PendingObserver {
                        tick_issued: tick,
                        owner: object.owner,
                        parent: object.parent,
                    },
                );
            }
            SpawnDelivery::DirectMessage => {
                // the create message travels on the ordered reliable channel,
                // ahead of anything else sent about the object
                command.tick_issued = tick;
                let mut writer = ByteWriter::new();
                command.ser(&mut writer);
                ctx.replicator
                    .write_full_state(&object.behaviours, client, object.owner, &mut writer)?;
                ctx.outbox.send_raw(
                    client,
                    MessageType::CreateObject,
                    DeliveryClass::ReliableSequenced,
                    &writer.to_bytes(),
                );
                object.observers.insert(client);
            }
        }
        Ok(())
    }

    fn issue_despawn(&mut self, object_id: ObjectId, targets: Vec<ClientId>, ctx: &mut ReplicationContext) {
        match ctx.delivery {
            SpawnDelivery::Snapshot => {
                ctx.snapshot.record_despawn(
                    DespawnCommand::new(object_id),
                    Targets::Clients(targets),
                    &[],
                );
            }
            SpawnDelivery::DirectMessage => {
                let message = DestroyObjectMessage {
                    object_id,
                    tick: ctx.snapshot.current_tick(),
                };
                ctx.outbox.broadcast(&targets, &message);
            }
        }
    }

    /// Despawns an object everywhere it was spawned
    ///
    /// # Panics
    ///
    /// Panics if called on a client or if the object does not exist.
    /// Consider using `try_despawn` for non-panicking error handling.
    pub fn despawn(&mut self, object_id: ObjectId, ctx: &mut ReplicationContext) {
        if let Err(error) = self.try_despawn(object_id, ctx) {
            panic!("Cannot despawn object: {}", error);
        }
    }

    /// Despawns an object everywhere it was spawned
    ///
    /// Returns an error if called on a client or if the object does not exist.
    pub fn try_despawn(&mut self, object_id: ObjectId, ctx: &mut ReplicationContext) -> Result<(), ObjectError> {
        self.ensure_server("despawn objects")?;
        let object = self
            .objects
            .remove(&object_id)
            .ok_or(ObjectError::ObjectNotFound { object_id })?;

        let mut targets: Vec<ClientId> = object
            .observers
            .iter()
            .chain(object.pending_observers.keys())
            .copied()
            .collect();
        targets.sort_unstable();
        self.deferred_shows.retain(|(deferred, _)| *deferred != object_id);
        self.issue_despawn(object_id, targets, ctx);
        self.despawned_at
            .insert(object_id, ctx.snapshot.current_tick());
        self.release(&object, true);
        Ok(())
    }

    /// Despawns every object flagged to go away with its scene
    pub fn try_despawn_scene_objects(&mut self, ctx: &mut ReplicationContext) -> Result<usize, ObjectError> {
        self.ensure_server("unload scene objects")?;
        let mut doomed: Vec<ObjectId> = self
            .objects
            .values()
            .filter(|object| object.destroy_with_scene)
            .map(|object| object.id)
            .collect();
        doomed.sort_unstable();
        for object_id in &doomed {
            self.try_despawn(*object_id, ctx)?;
        }
        Ok(doomed.len())
    }

    // Local bookkeeping shared by every way an object leaves the directory
    fn release(&mut self, object: &NetworkObject, announce: bool) {
        if let Err(error) = self.ownership.try_remove(object.owner, object.id) {
            warn!("ownership table out of sync: {}", error);
        }
        if self.player_objects.get(&object.owner) == Some(&object.id) {
            self.player_objects.remove(&object.owner);
        }
        self.orphans.remove(&object.id);

        for child in self.objects.values_mut() {
            if child.parent == Some(object.id) && child.state == SpawnState::Spawned {
                child.parent = None;
                self.events.push(ObjectEvent::ParentChanged {
                    object_id: child.id,
                    parent: None,
                });
            }
        }

        if announce {
            self.events
                .push(ObjectEvent::Despawned { object_id: object.id });
        }
    }

    // Visibility

    /// Makes the object visible to `client`, issuing its spawn
    ///
    /// # Panics
    ///
    /// Panics if the visibility change is invalid.
    /// Consider using `try_show` for non-panicking error handling.
    pub fn show(&mut self, object_id: ObjectId, client: ClientId, ctx: &mut ReplicationContext) {
        if let Err(error) = self.try_show(object_id, client, ctx) {
            panic!("Cannot show object: {}", error);
        }
    }

    /// Makes the object visible to `client`, issuing its spawn
    ///
    /// Returns an error if called on a client, if the object is not spawned,
    /// or if `client` already sees it.
    pub fn try_show(&mut self, object_id: ObjectId, client: ClientId, ctx: &mut ReplicationContext) -> Result<(), ObjectError> {
        self.check_show(object_id, client)?;
        self.show_unchecked(object_id, client, ctx)
    }

    /// Shows every object to `client`, or none if any of them cannot be shown
    pub fn try_show_many(
        &mut self,
        object_ids: &[ObjectId],
        client: ClientId,
        ctx: &mut ReplicationContext,
    ) -> Result<(), ObjectError> {
        for object_id in object_ids {
            self.check_show(*object_id, client)?;
        }
        for object_id in object_ids {
            self.show_unchecked(*object_id, client, ctx)?;
        }
        Ok(())
    }

    fn check_show(&self, object_id: ObjectId, client: ClientId) -> Result<(), ObjectError> {
        self.ensure_server("change visibility")?;
        let object = self.spawned(object_id)?;
        if client == SERVER_CLIENT_ID
            || object.observers.contains(&client)
            || object.pending_observers.contains_key(&client)
            || self.deferred_shows.contains(&(object_id, client))
        {
            return Err(ObjectError::AlreadyVisible { object_id, client });
        }
        Ok(())
    }

    fn show_unchecked(&mut self, object_id: ObjectId, client: ClientId, ctx: &mut ReplicationContext) -> Result<(), ObjectError> {
        // a spawn stamped with the same tick as the hide would lose against it
        if self.hidden_at.get(&(object_id, client)) == Some(&ctx.snapshot.current_tick()) {
            self.deferred_shows.push((object_id, client));
            return Ok(());
        }
        self.issue_spawn(object_id, client, ctx)
    }

    /// Hides the object from `client`, issuing its despawn
    ///
    /// # Panics
    ///
    /// Panics if the visibility change is invalid.
    /// Consider using `try_hide` for non-panicking error handling.
    pub fn hide(&mut self, object_id: ObjectId, client: ClientId, ctx: &mut ReplicationContext) {
        if let Err(error) = self.try_hide(object_id, client, ctx) {
            panic!("Cannot hide object: {}", error);
        }
    }

    /// Hides the object from `client`, issuing its despawn
    ///
    /// Returns an error if called on a client, if the object is not spawned,
    /// if `client` is the server or does not see the object.
    pub fn try_hide(&mut self, object_id: ObjectId, client: ClientId, ctx: &mut ReplicationContext) -> Result<(), ObjectError> {
        self.check_hide(object_id, client)?;
        self.hide_unchecked(object_id, client, ctx);
        Ok(())
    }

    /// Hides every object from `client`, or none if any of them cannot be hidden
    pub fn try_hide_many(
        &mut self,
        object_ids: &[ObjectId],
        client: ClientId,
        ctx: &mut ReplicationContext,
    ) -> Result<(), ObjectError> {
        for object_id in object_ids {
            self.check_hide(*object_id, client)?;
        }
        for object_id in object_ids {
            self.hide_unchecked(*object_id, client, ctx);
        }
        Ok(())
    }

    fn check_hide(&self, object_id: ObjectId, client: ClientId) -> Result<(), ObjectError> {
        self.ensure_server("change visibility")?;
        let object = self.spawned(object_id)?;
        if client == SERVER_CLIENT_ID {
            return Err(ObjectError::CannotHideFromServer { object_id });
        }
        if !object.observers.contains(&client)
            && !object.pending_observers.contains_key(&client)
            && !self.deferred_shows.contains(&(object_id, client))
        {
            return Err(ObjectError::AlreadyHidden { object_id, client });
        }
        Ok(())
    }

    fn hide_unchecked(&mut self, object_id: ObjectId, client: ClientId, ctx: &mut ReplicationContext) {
        if let Some(position) = self
            .deferred_shows
            .iter()
            .position(|deferred| *deferred == (object_id, client))
        {
            // the spawn was never issued, so there is nothing to despawn
            self.deferred_shows.remove(position);
            return;
        }
        if let Some(object) = self.objects.get_mut(&object_id) {
            object.observers.remove(&client);
            object.pending_observers.remove(&client);
        }
        self.hidden_at
            .insert((object_id, client), ctx.snapshot.current_tick());
        self.issue_despawn(object_id, vec![client], ctx);
    }

    /// Issues the spawns deferred by a hide in the previous tick and forgets
    /// per-tick bookkeeping. Runs once per frame before the snapshot tick.
    pub fn issue_deferred(&mut self, ctx: &mut ReplicationContext) {
        let tick = ctx.snapshot.current_tick();
        self.despawned_at.retain(|_, despawned| *despawned == tick);
        self.hidden_at.retain(|_, hidden| *hidden == tick);

        for (object_id, client) in std::mem::take(&mut self.deferred_shows) {
            if self.hidden_at.contains_key(&(object_id, client)) {
                self.deferred_shows.push((object_id, client));
                continue;
            }
            if let Err(error) = self.issue_spawn(object_id, client, ctx) {
                warn!("dropping deferred show of object {} to client {}: {}", object_id, client, error);
            }
        }
    }

    /// Promotes `client` from pending to confirmed observer of every object
    /// whose latest spawn it acknowledged. A newly confirmed observer gets the
    /// full variable state, plus owner and parent if they changed since the
    /// spawn was issued.
    pub fn confirm_spawns(&mut self, client: ClientId, acknowledged: &[SpawnCommand], ctx: &mut ReplicationContext) {
        let tick = ctx.snapshot.current_tick();
        for command in acknowledged {
            let Some(object) = self.objects.get_mut(&command.object_id) else {
                continue;
            };
            let Some(pending) = object.pending_observers.get(&client).copied() else {
                continue;
            };
            if pending.tick_issued != command.tick_issued {
                continue;
            }
            object.pending_observers.remove(&client);
            object.observers.insert(client);

            let scope = DeltaScope {
                object_id: object.id,
                owner: object.owner,
                role: self.host_type,
                local_client: self.local_client,
                tick,
            };
            if let Err(error) = ctx
                .replicator
                .write_full_sync(scope, &object.behaviours, client, ctx.outbox)
            {
                warn!("cannot sync variables of object {} to client {}: {}", object.id, client, error);
            }
            if object.owner != pending.owner {
                ctx.outbox.send(
                    client,
                    &ChangeOwnershipMessage {
                        object_id: object.id,
                        owner: object.owner,
                    },
                );
            }
            if object.parent != pending.parent {
                ctx.outbox.send(
                    client,
                    &ParentSyncMessage {
                        object_id: object.id,
                        parent: object.parent,
                        world_position_stays: true,
                        transform: object.transform,
                    },
                );
            }
            debug!("client {} now observes object {}", client, object.id);
        }
    }

    // Connections

    /// Issues spawns for every object visible to a newly approved client.
    /// Returns how many were issued.
    pub fn on_client_connected(&mut self, client: ClientId, ctx: &mut ReplicationContext) -> usize {
        if self.host_type != HostType::Server {
            return 0;
        }
        let mut visible: Vec<ObjectId> = self
            .objects
            .values()
            .filter(|object| object.is_spawned() && object.is_visible_to(client))
            .map(|object| object.id)
            .collect();
        visible.sort_unstable();

        let mut issued = 0;
        for object_id in visible {
            match self.issue_spawn(object_id, client, ctx) {
                Ok(()) => issued += 1,
                Err(error) => warn!("cannot spawn object {} for client {}: {}", object_id, client, error),
            }
        }
        issued
    }

    /// Forgets a disconnected client: drops it from every observer set and
    /// despawns the objects it owned, or hands them to the server when they
    /// are flagged to outlive their owner
    pub fn on_client_disconnected(&mut self, client: ClientId, ctx: &mut ReplicationContext) {
        if self.host_type != HostType::Server {
            return;
        }
        for object in self.objects.values_mut() {
            object.observers.remove(&client);
            object.pending_observers.remove(&client);
        }
        self.deferred_shows.retain(|(_, deferred)| *deferred != client);
        self.hidden_at.retain(|(_, hidden), _| *hidden != client);

        for object_id in self.ownership.owned_by(client) {
            let keep = self
                .objects
                .get(&object_id)
                .is_some_and(|object| object.dont_destroy_with_owner);
            let result = if keep {
                self.try_remove_ownership(object_id, ctx)
            } else {
                self.try_despawn(object_id, ctx)
            };
            if let Err(error) = result {
                warn!("cannot clean up object {} of client {}: {}", object_id, client, error);
            }
        }
        self.player_objects.remove(&client);
    }

    // Parenting

    /// Reparents an object and tells every observer
    ///
    /// # Panics
    ///
    /// Panics if the reparent is invalid.
    /// Consider using `try_set_parent` for non-panicking error handling.
    pub fn set_parent(
        &mut self,
        object_id: ObjectId,
        parent: Option<ObjectId>,
        world_position_stays: bool,
        ctx: &mut ReplicationContext,
    ) {
        if let Err(error) = self.try_set_parent(object_id, parent, world_position_stays, ctx) {
            panic!("Cannot set parent: {}", error);
        }
    }

    /// Reparents an object and tells every observer. `None` detaches it.
    ///
    /// Returns an error if called on a client, if either object is not
    /// spawned, or if `parent` is the object itself or one of its descendants.
    pub fn try_set_parent(
        &mut self,
        object_id: ObjectId,
        parent: Option<ObjectId>,
        world_position_stays: bool,
        ctx: &mut ReplicationContext,
    ) -> Result<(), ObjectError> {
        self.ensure_server("reparent objects")?;
        self.spawned(object_id)?;
        if let Some(parent_id) = parent {
            if !self.is_spawned(parent_id) {
                return Err(ObjectError::ParentNotSpawned {
                    object_id,
                    parent: parent_id,
                });
            }
            let mut cursor = Some(parent_id);
            let mut steps = 0;
            while let Some(ancestor) = cursor {
                if ancestor == object_id || steps > self.objects.len() {
                    return Err(ObjectError::CyclicParent {
                        object_id,
                        parent: parent_id,
                    });
                }
                cursor = self.objects.get(&ancestor).and_then(|object| object.parent);
                steps += 1;
            }
        }

        let object = self.spawned_mut(object_id)?;
        object.parent = parent;
        let message = ParentSyncMessage {
            object_id,
            parent,
            world_position_stays,
            transform: object.transform,
        };
        let observers = object.observers();
        ctx.outbox.broadcast(&observers, &message);
        self.events
            .push(ObjectEvent::ParentChanged { object_id, parent });
        Ok(())
    }

    /// Updates the transform captured by later spawn and parent messages
    pub fn set_transform(&mut self, object_id: ObjectId, transform: Transform) -> Result<(), ObjectError> {
        let object = self
            .objects
            .get_mut(&object_id)
            .ok_or(ObjectError::ObjectNotFound { object_id })?;
        object.transform = transform;
        Ok(())
    }

    // Ownership

    /// Gives the object to `new_owner` and tells every observer
    ///
    /// # Panics
    ///
    /// Panics if the transfer is invalid.
    /// Consider using `try_change_ownership` for non-panicking error handling.
    pub fn change_ownership(&mut self, object_id: ObjectId, new_owner: ClientId, ctx: &mut ReplicationContext) {
        if let Err(error) = self.try_change_ownership(object_id, new_owner, ctx) {
            panic!("Cannot change ownership: {}", error);
        }
    }

    /// Gives the object to `new_owner` and tells every observer
    ///
    /// Returns an error if called on a client or if the object is not spawned.
    pub fn try_change_ownership(
        &mut self,
        object_id: ObjectId,
        new_owner: ClientId,
        ctx: &mut ReplicationContext,
    ) -> Result<(), ObjectError> {
        self.ensure_server("change ownership")?;
        let previous = self.spawned(object_id)?.owner;
        if previous == new_owner {
            return Ok(());
        }
        self.ownership
            .try_transfer(object_id, previous, new_owner)?;

        let object = self.spawned_mut(object_id)?;
        object.owner = new_owner;
        let observers = object.observers();
        ctx.outbox.broadcast(
            &observers,
            &ChangeOwnershipMessage {
                object_id,
                owner: new_owner,
            },
        );
        self.notify_ownership(object_id, previous, new_owner);
        Ok(())
    }

    /// Hands the object back to the server
    pub fn try_remove_ownership(&mut self, object_id: ObjectId, ctx: &mut ReplicationContext) -> Result<(), ObjectError> {
        self.try_change_ownership(object_id, SERVER_CLIENT_ID, ctx)
    }

    fn notify_ownership(&mut self, object_id: ObjectId, previous: ClientId, new_owner: ClientId) {
        let local = self.local_client;
        let Some(object) = self.objects.get_mut(&object_id) else {
            return;
        };
        if previous == local {
            for behaviour in object.behaviours.iter_mut() {
                behaviour.on_lost_ownership();
            }
            self.events
                .push(ObjectEvent::LostOwnership { object_id });
        }
        if new_owner == local {
            for behaviour in object.behaviours.iter_mut() {
                behaviour.on_gained_ownership();
            }
            self.events
                .push(ObjectEvent::GainedOwnership { object_id });
        }
    }

    // Applying what the server sent

    /// Materialises or refreshes an object from a spawn command. Returns
    /// whether a new object was created.
    pub fn apply_spawn_command(&mut self, sender: ClientId, command: &SpawnCommand) -> bool {
        if self.host_type == HostType::Server {
            warn!("ignoring spawn of object {} sent by client {}", command.object_id, sender);
            return false;
        }
        let object_id = command.object_id;

        if let Some(object) = self.objects.get_mut(&object_id) {
            let previous = object.owner;
            object.transform = command.transform;
            if object.parent != command.parent {
                object.parent = command.parent;
                self.events.push(ObjectEvent::ParentChanged {
                    object_id,
                    parent: command.parent,
                });
            }
            if previous != command.owner {
                object.owner = command.owner;
                if let Err(error) = self.ownership.try_transfer(object_id, previous, command.owner) {
                    warn!("ownership table out of sync: {}", error);
                }
                self.notify_ownership(object_id, previous, command.owner);
            }
            return false;
        }

        let behaviours = match self.persisted.remove(&object_id) {
            Some(persisted) => persisted.behaviours,
            None => match self.archetypes.instantiate(command.archetype) {
                Ok(behaviours) => behaviours,
                Err(error) => {
                    warn!("cannot spawn object {}: {}", object_id, error);
                    return false;
                }
            },
        };
        if let Err(error) = self.ownership.try_add(command.owner, object_id) {
            warn!("ownership table out of sync: {}", error);
        }
        if command.is_player_object {
            self.player_objects.insert(command.owner, object_id);
        }
        self.objects
            .insert(object_id, NetworkObject::from_command(command, behaviours));

        match command.parent {
            Some(parent) if !self.is_spawned(parent) => {
                debug!("holding object {} until its parent {} arrives", object_id, parent);
                self.orphans.insert(object_id);
            }
            _ => self.activate(object_id),
        }
        true
    }

    fn activate(&mut self, object_id: ObjectId) {
        let local = self.local_client;
        let Some(object) = self.objects.get_mut(&object_id) else {
            return;
        };
        object.state = SpawnState::Spawned;
        self.events.push(ObjectEvent::Spawned {
            object_id,
            archetype: object.archetype,
        });
        if object.owner == local {
            for behaviour in object.behaviours.iter_mut() {
                behaviour.on_gained_ownership();
            }
            self.events
                .push(ObjectEvent::GainedOwnership { object_id });
        }
    }

    /// Removes an object because of a despawn command. Scene objects are
    /// kept aside to be reused by a later spawn. Returns whether an object
    /// was removed.
    pub fn apply_despawn_command(&mut self, sender: ClientId, command: &DespawnCommand) -> bool {
        if self.host_type == HostType::Server {
            warn!("ignoring despawn of object {} sent by client {}", command.object_id, sender);
            return false;
        }
        let Some(mut object) = self.objects.remove(&command.object_id) else {
            debug!("despawn of unknown object {}", command.object_id);
            return false;
        };
        let was_spawned = object.is_spawned();
        self.release(&object, was_spawned);
        if object.is_scene_object {
            object.state = SpawnState::Unspawned;
            object.parent = None;
            self.persisted.insert(object.id, object);
        }
        true
    }

    /// Reads a direct-mode create message: a spawn command followed by the
    /// object's full variable state
    pub fn handle_create_object(
        &mut self,
        sender: ClientId,
        reader: &mut ByteReader,
        snapshot: &mut SnapshotEngine,
        replicator: &VariableReplicator,
    ) -> Result<(), ObjectError> {
        let command = SpawnCommand::de(reader)?;
        if !snapshot.try_mark_applied(command.object_id, command.tick_issued, false) {
            debug!("skipping stale create of object {}", command.object_id);
            return Ok(());
        }
        self.apply_spawn_command(sender, &command);

        if let Some(object) = self.objects.get_mut(&command.object_id) {
            let scope = ReadScope {
                object_id: object.id,
                owner: object.owner,
                role: self.host_type,
                sender,
            };
            replicator.read_full_state(scope, &mut object.behaviours, reader)?;
        }
        Ok(())
    }

    pub fn handle_destroy_object(
        &mut self,
        sender: ClientId,
        message: &DestroyObjectMessage,
        snapshot: &mut SnapshotEngine,
    ) -> bool {
        if !snapshot.try_mark_applied(message.object_id, message.tick, true) {
            debug!("skipping stale destroy of object {}", message.object_id);
            return false;
        }
        let mut command = DespawnCommand::new(message.object_id);
        command.tick_issued = message.tick;
        self.apply_despawn_command(sender, &command)
    }

    pub fn handle_change_ownership(&mut self, message: &ChangeOwnershipMessage) -> Result<(), ObjectError> {
        let object_id = message.object_id;
        let object = self
            .objects
            .get_mut(&object_id)
            .ok_or(ObjectError::ObjectNotFound { object_id })?;
        let previous = object.owner;
        if previous == message.owner {
            return Ok(());
        }
        self.ownership
            .try_transfer(object_id, previous, message.owner)?;
        object.owner = message.owner;
        self.notify_ownership(object_id, previous, message.owner);
        Ok(())
    }

    pub fn handle_parent_sync(&mut self, message: &ParentSyncMessage) -> Result<(), ObjectError> {
        let object_id = message.object_id;
        let object = self
            .objects
            .get_mut(&object_id)
            .ok_or(ObjectError::ObjectNotFound { object_id })?;
        object.parent = message.parent;
        object.transform = message.transform;
        let state = object.state;

        match message.parent {
            Some(parent) if !self.is_spawned(parent) => {
                debug!("object {} waits for its new parent {}", object_id, parent);
                self.orphans.insert(object_id);
            }
            _ => {
                self.orphans.remove(&object_id);
                if state == SpawnState::Spawning {
                    self.activate(object_id);
                } else {
                    self.events.push(ObjectEvent::ParentChanged {
                        object_id,
                        parent: message.parent,
                    });
                }
            }
        }
        Ok(())
    }

    /// Applies one variable delta. Returns how many fields changed.
    pub fn handle_variable_delta(
        &mut self,
        sender: ClientId,
        reader: &mut ByteReader,
        replicator: &VariableReplicator,
    ) -> Result<usize, ObjectError> {
        let header = VariableDeltaHeader::de(reader)?;
        let object_id = header.object_id;
        let object = self
            .objects
            .get_mut(&object_id)
            .ok_or(ObjectError::ObjectNotFound { object_id })?;
        let scope = ReadScope {
            object_id,
            owner: object.owner,
            role: self.host_type,
            sender,
        };
        let count = object.behaviours.len();
        let behaviour = object
            .behaviours
            .get_mut(header.behaviour_index as usize)
            .ok_or(VariableError::BehaviourOutOfRange {
                object_id,
                index: header.behaviour_index,
                count,
            })?;
        Ok(replicator.read_fields(scope, behaviour.as_mut(), reader)?)
    }

    /// Queues the deltas of every spawned object: to its confirmed observers
    /// on the server, to the server on a client
    pub fn write_variable_deltas(&mut self, ctx: &mut ReplicationContext) -> usize {
        let tick = ctx.snapshot.current_tick();
        let mut queued = 0;
        for object in self.objects.values_mut() {
            if !object.is_spawned() {
                continue;
            }
            let recipients = match self.host_type {
                HostType::Server => object.observers(),
                HostType::Client => vec![SERVER_CLIENT_ID],
            };
            let scope = DeltaScope {
                object_id: object.id,
                owner: object.owner,
                role: self.host_type,
                local_client: self.local_client,
                tick,
            };
            match ctx
                .replicator
                .write_deltas(scope, &mut object.behaviours, &recipients, ctx.outbox)
            {
                Ok(count) => queued += count,
                Err(error) => warn!("cannot write variables of object {}: {}", object.id, error),
            }
        }
        queued
    }

    // Orphans

    /// Activates every orphan whose parent is now spawned. Chains resolve in
    /// one call since a freshly activated parent frees its own children.
    /// Returns how many orphans were resolved.
    pub fn check_orphans(&mut self) -> usize {
        let mut resolved = 0;
        loop {
            let mut ready: Vec<ObjectId> = self
                .orphans
                .iter()
                .copied()
                .filter(|object_id| {
                    self.objects
                        .get(object_id)
                        .and_then(|object| object.parent)
                        .map_or(true, |parent| self.is_spawned(parent))
                })
                .collect();
            if ready.is_empty() {
                return resolved;
            }
            ready.sort_unstable();

            for object_id in ready {
                self.orphans.remove(&object_id);
                resolved += 1;
                let Some(object) = self.objects.get(&object_id) else {
                    continue;
                };
                if object.state == SpawnState::Spawning {
                    self.activate(object_id);
                } else {
                    let parent = object.parent;
                    self.events
                        .push(ObjectEvent::ParentChanged { object_id, parent });
                }
            }
        }
    }

    /// Logs the orphans still waiting at the end of a frame
    pub fn warn_orphans(&self) {
        if self.orphans.is_empty() {
            return;
        }
        let mut orphans: Vec<ObjectId> = self.orphans.iter().copied().collect();
        orphans.sort_unstable();
        warn!(
            "{} objects are still waiting for their parent at the end of the frame: {:?}",
            orphans.len(),
            orphans
        );
    }

    pub fn is_orphan(&self, object_id: ObjectId) -> bool {
        self.orphans.contains(&object_id)
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    // Queries

    pub fn get(&self, object_id: ObjectId) -> Option<&NetworkObject> {
        self.objects.get(&object_id)
    }

    pub fn get_mut(&mut self, object_id: ObjectId) -> Option<&mut NetworkObject> {
        self.objects.get_mut(&object_id)
    }

    /// A despawned scene object waiting to be spawned again
    pub fn persisted(&self, object_id: ObjectId) -> Option<&NetworkObject> {
        self.persisted.get(&object_id)
    }

    pub fn contains(&self, object_id: ObjectId) -> bool {
        self.objects.contains_key(&object_id)
    }

    pub fn is_spawned(&self, object_id: ObjectId) -> bool {
        self.objects
            .get(&object_id)
            .is_some_and(NetworkObject::is_spawned)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Every local object id, in ascending order
    pub fn object_ids(&self) -> Vec<ObjectId> {
        let mut object_ids: Vec<ObjectId> = self.objects.keys().copied().collect();
        object_ids.sort_unstable();
        object_ids
    }

    pub fn ownership(&self) -> &OwnershipTable {
        &self.ownership
    }

    pub fn owned_by(&self, client: ClientId) -> Vec<ObjectId> {
        self.ownership.owned_by(client)
    }

    pub fn player_object(&self, client: ClientId) -> Option<ObjectId> {
        self.player_objects.get(&client).copied()
    }

    pub fn take_events(&mut self) -> Vec<ObjectEvent> {
        std::mem::take(&mut self.events)
    }

    /// Despawns everything locally, without telling any peer
    pub fn clear(&mut self) {
        for object_id in self.object_ids() {
            if let Some(object) = self.objects.remove(&object_id) {
                self.release(&object, object.is_spawned());
            }
        }
        self.persisted.clear();
        self.orphans.clear();
        self.ownership.clear();
        self.player_objects.clear();
        self.despawned_at.clear();
        self.hidden_at.clear();
        self.deferred_shows.clear();
        self.next_object_id = 1;
    }
}

impl SnapshotApplier for ObjectDirectory {
    fn apply_spawn(&mut self, sender: ClientId, command: &SpawnCommand) {
        self.apply_spawn_command(sender, command);
    }

    fn apply_despawn(&mut self, sender: ClientId, command: &DespawnCommand) {
        self.apply_despawn_command(sender, command);
    }
}
