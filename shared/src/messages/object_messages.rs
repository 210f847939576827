use snapsync_serde::{ByteReader, ByteWriter, ConstByteLength, Serde, SerdeErr};

use crate::{
    messages::{message::NetworkMessage, message_type::MessageType},
    transport::DeliveryClass,
    types::{ClientId, ObjectId, Tick, Transform},
};

/// Direct-mode counterpart of a despawn command
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DestroyObjectMessage {
    pub object_id: ObjectId,
    pub tick: Tick,
}

impl Serde for DestroyObjectMessage {
    fn ser(&self, writer: &mut ByteWriter) {
        writer.write_u64(self.object_id);
        writer.write_i32(self.tick);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            object_id: reader.read_u64()?,
            tick: reader.read_i32()?,
        })
    }

    fn byte_length(&self) -> usize {
        12
    }
}

impl NetworkMessage for DestroyObjectMessage {
    const MESSAGE_TYPE: MessageType = MessageType::DestroyObject;
    const DELIVERY: DeliveryClass = DeliveryClass::ReliableSequenced;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeOwnershipMessage {
    pub object_id: ObjectId,
    pub owner: ClientId,
}

impl Serde for ChangeOwnershipMessage {
    fn ser(&self, writer: &mut ByteWriter) {
        writer.write_u64(self.object_id);
        writer.write_u64(self.owner);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            object_id: reader.read_u64()?,
            owner: reader.read_u64()?,
        })
    }

    fn byte_length(&self) -> usize {
        16
    }
}

impl NetworkMessage for ChangeOwnershipMessage {
    const MESSAGE_TYPE: MessageType = MessageType::ChangeOwnership;
    const DELIVERY: DeliveryClass = DeliveryClass::ReliableSequenced;
}

/// Broadcast after a successful reparent
#[derive(Clone, Debug, PartialEq)]
pub struct ParentSyncMessage {
    pub object_id: ObjectId,
    pub parent: Option<ObjectId>,
    pub world_position_stays: bool,
    pub transform: Transform,
}

impl Serde for ParentSyncMessage {
    fn ser(&self, writer: &mut ByteWriter) {
        writer.write_u64(self.object_id);
        self.parent.ser(writer);
        writer.write_bool(self.world_position_stays);
        self.transform.ser(writer);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            object_id: reader.read_u64()?,
            parent: reader.read()?,
            world_position_stays: reader.read_bool()?,
            transform: reader.read()?,
        })
    }

    fn byte_length(&self) -> usize {
        8 + self.parent.byte_length() + 1 + Transform::const_byte_length()
    }
}

impl NetworkMessage for ParentSyncMessage {
    const MESSAGE_TYPE: MessageType = MessageType::ParentSync;
    const DELIVERY: DeliveryClass = DeliveryClass::ReliableSequenced;
}
