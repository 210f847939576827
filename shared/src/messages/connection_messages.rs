use snapsync_serde::{ByteReader, ByteWriter, Serde, SerdeErr};

use crate::{
    messages::{message::NetworkMessage, message_type::MessageType},
    transport::DeliveryClass,
    types::{ClientId, Tick},
};

/// Sent by a client once its transport connected, carries the approval payload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionRequestMessage {
    pub payload: Vec<u8>,
}

impl Serde for ConnectionRequestMessage {
    fn ser(&self, writer: &mut ByteWriter) {
        self.payload.ser(writer);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            payload: reader.read()?,
        })
    }

    fn byte_length(&self) -> usize {
        self.payload.byte_length()
    }
}

impl NetworkMessage for ConnectionRequestMessage {
    const MESSAGE_TYPE: MessageType = MessageType::ConnectionRequest;
    const DELIVERY: DeliveryClass = DeliveryClass::ReliableSequenced;
}

/// Sent by the server when a pending client is approved
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionApprovedMessage {
    pub client_id: ClientId,
    pub server_tick: Tick,
}

impl Serde for ConnectionApprovedMessage {
    fn ser(&self, writer: &mut ByteWriter) {
        writer.write_u64(self.client_id);
        writer.write_i32(self.server_tick);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            client_id: reader.read_u64()?,
            server_tick: reader.read_i32()?,
        })
    }

    fn byte_length(&self) -> usize {
        12
    }
}

impl NetworkMessage for ConnectionApprovedMessage {
    const MESSAGE_TYPE: MessageType = MessageType::ConnectionApproved;
    const DELIVERY: DeliveryClass = DeliveryClass::ReliableSequenced;
}
