use snapsync_serde::{ByteReader, ByteWriter, ConstByteLength, Serde, SerdeErr};

use crate::types::{ArchetypeHash, ClientId, ObjectId, Tick, Transform, NO_TICK};

/// Everything a peer needs to materialise one object
#[derive(Clone, Debug, PartialEq)]
pub struct SpawnCommand {
    pub object_id: ObjectId,
    pub archetype: ArchetypeHash,
    pub owner: ClientId,
    pub parent: Option<ObjectId>,
    pub is_scene_object: bool,
    pub is_player_object: bool,
    pub transform: Transform,
    pub tick_issued: Tick,
}

impl SpawnCommand {
    pub fn new(object_id: ObjectId, archetype: ArchetypeHash, owner: ClientId) -> Self {
        Self {
            object_id,
            archetype,
            owner,
            parent: None,
            is_scene_object: false,
            is_player_object: false,
            transform: Transform::IDENTITY,
            tick_issued: NO_TICK,
        }
    }
}

// On the wire a missing parent is encoded as the object's own id
impl Serde for SpawnCommand {
    fn ser(&self, writer: &mut ByteWriter) {
        writer.write_u64(self.object_id);
        writer.write_u32(self.archetype);
        writer.write_bool(self.is_scene_object);
        writer.write_bool(self.is_player_object);
        writer.write_u64(self.owner);
        writer.write_u64(self.parent.unwrap_or(self.object_id));
        self.transform.ser(writer);
        writer.write_i32(self.tick_issued);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        let object_id = reader.read_u64()?;
        let archetype = reader.read_u32()?;
        let is_scene_object = reader.read_bool()?;
        let is_player_object = reader.read_bool()?;
        let owner = reader.read_u64()?;
        let parent_id = reader.read_u64()?;
        let transform = reader.read()?;
        let tick_issued = reader.read_i32()?;
        Ok(Self {
            object_id,
            archetype,
            owner,
            parent: (parent_id != object_id).then_some(parent_id),
            is_scene_object,
            is_player_object,
            transform,
            tick_issued,
        })
    }

    fn byte_length(&self) -> usize {
        Self::const_byte_length()
    }
}

impl ConstByteLength for SpawnCommand {
    fn const_byte_length() -> usize {
        8 + 4 + 1 + 1 + 8 + 8 + Transform::const_byte_length() + 4
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DespawnCommand {
    pub object_id: ObjectId,
    pub tick_issued: Tick,
}

impl DespawnCommand {
    pub fn new(object_id: ObjectId) -> Self {
        Self {
            object_id,
            tick_issued: NO_TICK,
        }
    }
}

impl Serde for DespawnCommand {
    fn ser(&self, writer: &mut ByteWriter) {
        writer.write_u64(self.object_id);
        writer.write_i32(self.tick_issued);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            object_id: reader.read_u64()?,
            tick_issued: reader.read_i32()?,
        })
    }

    fn byte_length(&self) -> usize {
        Self::const_byte_length()
    }
}

impl ConstByteLength for DespawnCommand {
    fn const_byte_length() -> usize {
        12
    }
}

/// Who a recorded command is addressed to
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Targets {
    /// Server: every connected client except the local one. Client: the server.
    #[default]
    Default,
    Clients(Vec<ClientId>),
}

impl Targets {
    pub fn single(client: ClientId) -> Self {
        Targets::Clients(vec![client])
    }
}
