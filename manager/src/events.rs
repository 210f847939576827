use std::{mem, vec::IntoIter};

use snapsync_shared::{ArchetypeHash, ClientId, ObjectEvent, ObjectId};

use crate::error::ManagerError;

/// Everything that happened since the events were last taken
pub struct NetworkEvents {
    connections: Vec<ClientId>,
    disconnections: Vec<ClientId>,
    approval_requests: Vec<(ClientId, Vec<u8>)>,
    spawns: Vec<(ObjectId, ArchetypeHash)>,
    despawns: Vec<ObjectId>,
    gained_ownership: Vec<ObjectId>,
    lost_ownership: Vec<ObjectId>,
    parent_changes: Vec<(ObjectId, Option<ObjectId>)>,
    messages: Vec<(ClientId, u8, Vec<u8>)>,
    errors: Vec<ManagerError>,

    empty: bool,
}

impl NetworkEvents {
    pub(crate) fn new() -> Self {
        Self {
            connections: Vec::new(),
            disconnections: Vec::new(),
            approval_requests: Vec::new(),
            spawns: Vec::new(),
            despawns: Vec::new(),
            gained_ownership: Vec::new(),
            lost_ownership: Vec::new(),
            parent_changes: Vec::new(),
            messages: Vec::new(),
            errors: Vec::new(),

            empty: true,
        }
    }

    // Public

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn read<V: NetworkEvent>(&mut self) -> V::Iter {
        V::iter(self)
    }

    pub fn has<V: NetworkEvent>(&self) -> bool {
        V::has(self)
    }

    // Crate-public

    pub(crate) fn push_connection(&mut self, client: ClientId) {
        self.connections.push(client);
        self.empty = false;
    }

    pub(crate) fn push_disconnection(&mut self, client: ClientId) {
        self.disconnections.push(client);
        self.empty = false;
    }

    pub(crate) fn push_approval_request(&mut self, client: ClientId, payload: Vec<u8>) {
        self.approval_requests.push((client, payload));
        self.empty = false;
    }

    pub(crate) fn push_message(&mut self, client: ClientId, message_id: u8, payload: Vec<u8>) {
        self.messages.push((client, message_id, payload));
        self.empty = false;
    }

    pub(crate) fn push_error(&mut self, error: ManagerError) {
        self.errors.push(error);
        self.empty = false;
    }

    pub(crate) fn push_object_event(&mut self, event: ObjectEvent) {
        match event {
            ObjectEvent::Spawned {
                object_id,
                archetype,
            } => self.spawns.push((object_id, archetype)),
            ObjectEvent::Despawned { object_id } => self.despawns.push(object_id),
            ObjectEvent::GainedOwnership { object_id } => self.gained_ownership.push(object_id),
            ObjectEvent::LostOwnership { object_id } => self.lost_ownership.push(object_id),
            ObjectEvent::ParentChanged { object_id, parent } => {
                self.parent_changes.push((object_id, parent))
            }
        }
        self.empty = false;
    }
}

impl Default for NetworkEvents {
    fn default() -> Self {
        Self::new()
    }
}

// Event Trait
pub trait NetworkEvent {
    type Iter;

    fn iter(events: &mut NetworkEvents) -> Self::Iter;

    fn has(events: &NetworkEvents) -> bool;
}

macro_rules! network_event {
    ($(#[$doc:meta])* $name:ident, $field:ident, $item:ty) => {
        $(#[$doc])*
        pub struct $name;
        impl NetworkEvent for $name {
            type Iter = IntoIter<$item>;

            fn iter(events: &mut NetworkEvents) -> Self::Iter {
                let list = mem::take(&mut events.$field);
                IntoIterator::into_iter(list)
            }

            fn has(events: &NetworkEvents) -> bool {
                !events.$field.is_empty()
            }
        }
    };
}

network_event!(
    /// A client finished approval. On a client, the client's own id.
    ConnectEvent, connections, ClientId
);
network_event!(
    /// A connected client left. On a client, `SERVER_CLIENT_ID` once the
    /// server is gone.
    DisconnectEvent, disconnections, ClientId
);
network_event!(
    /// A client asks to be approved, with the payload it sent
    ApprovalRequestEvent, approval_requests, (ClientId, Vec<u8>)
);
network_event!(SpawnEvent, spawns, (ObjectId, ArchetypeHash));
network_event!(DespawnEvent, despawns, ObjectId);
network_event!(GainedOwnershipEvent, gained_ownership, ObjectId);
network_event!(LostOwnershipEvent, lost_ownership, ObjectId);
network_event!(ParentChangedEvent, parent_changes, (ObjectId, Option<ObjectId>));
network_event!(
    /// A custom message: sender, message id and payload
    MessageEvent, messages, (ClientId, u8, Vec<u8>)
);
network_event!(ErrorEvent, errors, ManagerError);
