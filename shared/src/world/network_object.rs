use std::collections::{HashMap, HashSet};

use crate::{
    snapshot::SpawnCommand,
    types::{ArchetypeHash, ClientId, ObjectId, Tick, Transform, NO_TICK, SERVER_CLIENT_ID},
    variables::Replicate,
};

/// Decides whether a client may observe an object
pub type VisibilityFn = Box<dyn Fn(ClientId) -> bool>;

/// Where an object is in its local lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpawnState {
    /// Received, but its parent is not known locally yet
    Spawning,
    /// Visible, behaviours active
    Spawned,
    /// A despawned scene object kept around to be spawned again
    Unspawned,
}

/// Everything the server needs to spawn an object
pub struct SpawnParams {
    pub archetype: ArchetypeHash,
    pub owner: ClientId,
    /// Use this id instead of the next free one, as scene objects do
    pub object_id: Option<ObjectId>,
    pub parent: Option<ObjectId>,
    pub is_scene_object: bool,
    pub is_player_object: bool,
    pub destroy_with_scene: bool,
    /// Hand the object back to the server instead of despawning it when its owner leaves
    pub dont_destroy_with_owner: bool,
    pub transform: Transform,
    /// Observers default to every connected client when unset
    pub visibility: Option<VisibilityFn>,
}

impl SpawnParams {
    pub fn new(archetype: ArchetypeHash) -> Self {
        Self {
            archetype,
            owner: SERVER_CLIENT_ID,
            object_id: None,
            parent: None,
            is_scene_object: false,
            is_player_object: false,
            destroy_with_scene: true,
            dont_destroy_with_owner: false,
            transform: Transform::IDENTITY,
            visibility: None,
        }
    }

    pub fn owner(mut self, owner: ClientId) -> Self {
        self.owner = owner;
        self
    }

    pub fn object_id(mut self, object_id: ObjectId) -> Self {
        self.object_id = Some(object_id);
        self
    }

    pub fn parent(mut self, parent: ObjectId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn scene_object(mut self) -> Self {
        self.is_scene_object = true;
        self
    }

    pub fn player_object(mut self) -> Self {
        self.is_player_object = true;
        self
    }

    pub fn destroy_with_scene(mut self, destroy_with_scene: bool) -> Self {
        self.destroy_with_scene = destroy_with_scene;
        self
    }

    pub fn dont_destroy_with_owner(mut self) -> Self {
        self.dont_destroy_with_owner = true;
        self
    }

    pub fn transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn visibility(mut self, visibility: impl Fn(ClientId) -> bool + 'static) -> Self {
        self.visibility = Some(Box::new(visibility));
        self
    }
}

// Owner and parent as they were when a spawn was issued to a pending observer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct PendingObserver {
    pub tick_issued: Tick,
    pub owner: ClientId,
    pub parent: Option<ObjectId>,
}

/// One replicated object
pub struct NetworkObject {
    pub(crate) id: ObjectId,
    pub(crate) archetype: ArchetypeHash,
    pub(crate) owner: ClientId,
    pub(crate) is_scene_object: bool,
    pub(crate) is_player_object: bool,
    pub(crate) parent: Option<ObjectId>,
    pub(crate) observers: HashSet<ClientId>,
    pub(crate) pending_observers: HashMap<ClientId, PendingObserver>,
    pub(crate) destroy_with_scene: bool,
    pub(crate) dont_destroy_with_owner: bool,
    pub(crate) transform: Transform,
    pub(crate) state: SpawnState,
    pub(crate) behaviours: Vec<Box<dyn Replicate>>,
    pub(crate) visibility: Option<VisibilityFn>,
}

impl NetworkObject {
    pub(crate) fn from_params(id: ObjectId, params: SpawnParams, behaviours: Vec<Box<dyn Replicate>>) -> Self {
        Self {
            id,
            archetype: params.archetype,
            owner: params.owner,
            is_scene_object: params.is_scene_object,
            is_player_object: params.is_player_object,
            parent: params.parent,
            observers: HashSet::new(),
            pending_observers: HashMap::new(),
            destroy_with_scene: params.destroy_with_scene,
            dont_destroy_with_owner: params.dont_destroy_with_owner,
            transform: params.transform,
            state: SpawnState::Spawned,
            behaviours,
            visibility: params.visibility,
        }
    }

    pub(crate) fn from_command(command: &SpawnCommand, behaviours: Vec<Box<dyn Replicate>>) -> Self {
        Self {
            id: command.object_id,
            archetype: command.archetype,
            owner: command.owner,
            is_scene_object: command.is_scene_object,
            is_player_object: command.is_player_object,
            parent: command.parent,
            observers: HashSet::new(),
            pending_observers: HashMap::new(),
            destroy_with_scene: true,
            dont_destroy_with_owner: false,
            transform: command.transform,
            state: SpawnState::Spawning,
            behaviours,
            visibility: None,
        }
    }

    pub(crate) fn spawn_command(&self) -> SpawnCommand {
        SpawnCommand {
            object_id: self.id,
            archetype: self.archetype,
            owner: self.owner,
            parent: self.parent,
            is_scene_object: self.is_scene_object,
            is_player_object: self.is_player_object,
            transform: self.transform,
            tick_issued: NO_TICK,
        }
    }

    pub(crate) fn is_visible_to(&self, client: ClientId) -> bool {
        self.visibility
            .as_ref()
            .map_or(true, |visibility| visibility(client))
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn archetype(&self) -> ArchetypeHash {
        self.archetype
    }

    pub fn owner(&self) -> ClientId {
        self.owner
    }

    /// `None` while the object is still spawning and its flags are not final
    pub fn is_scene_object(&self) -> Option<bool> {
        match self.state {
            SpawnState::Spawning => None,
            SpawnState::Spawned | SpawnState::Unspawned => Some(self.is_scene_object),
        }
    }

    pub fn is_player_object(&self) -> bool {
        self.is_player_object
    }

    pub fn parent(&self) -> Option<ObjectId> {
        self.parent
    }

    pub fn destroy_with_scene(&self) -> bool {
        self.destroy_with_scene
    }

    pub fn dont_destroy_with_owner(&self) -> bool {
        self.dont_destroy_with_owner
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn state(&self) -> SpawnState {
        self.state
    }

    pub fn is_spawned(&self) -> bool {
        self.state == SpawnState::Spawned
    }

    /// Clients that have applied this object's spawn, in ascending order
    pub fn observers(&self) -> Vec<ClientId> {
        let mut observers: Vec<ClientId> = self.observers.iter().copied().collect();
        observers.sort_unstable();
        observers
    }

    pub fn is_observer(&self, client: ClientId) -> bool {
        self.observers.contains(&client)
    }

    /// Whether a spawn was issued to `client` but not acknowledged yet
    pub fn is_pending_observer(&self, client: ClientId) -> bool {
        self.pending_observers.contains_key(&client)
    }

    pub fn behaviours(&self) -> &[Box<dyn Replicate>] {
        &self.behaviours
    }

    pub fn behaviours_mut(&mut self) -> &mut [Box<dyn Replicate>] {
        &mut self.behaviours
    }

    /// The first behaviour of type `T`
    pub fn behaviour<T: Replicate>(&self) -> Option<&T> {
        self.behaviours
            .iter()
            .find_map(|behaviour| behaviour.downcast_ref::<T>())
    }

    /// The first behaviour of type `T`, mutably
    pub fn behaviour_mut<T: Replicate>(&mut self) -> Option<&mut T> {
        self.behaviours
            .iter_mut()
            .find_map(|behaviour| behaviour.downcast_mut::<T>())
    }
}
