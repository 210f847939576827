use std::vec::Drain;

use snapsync_serde::ByteWriter;

use crate::{
    messages::{message::NetworkMessage, message_type::MessageType},
    transport::DeliveryClass,
    types::ClientId,
};

/// A framed message waiting for the end-of-tick flush
#[derive(Clone, Debug, PartialEq)]
pub struct OutgoingMessage {
    pub client: ClientId,
    pub delivery: DeliveryClass,
    pub bytes: Vec<u8>,
}

impl OutgoingMessage {
    /// The type id this message was framed with
    pub fn message_type_id(&self) -> Option<u8> {
        self.bytes.first().copied()
    }
}

/// Send queue shared by every component, flushed once per tick
#[derive(Default)]
pub struct Outbox {
    queue: Vec<OutgoingMessage>,
}

impl Outbox {
    pub fn new() -> Self {
        Self { queue: Vec::new() }
    }

    /// Frames and queues a typed message
    pub fn send<M: NetworkMessage>(&mut self, client: ClientId, message: &M) {
        let mut writer = ByteWriter::new();
        writer.write_u8(M::MESSAGE_TYPE.id());
        message.ser(&mut writer);
        self.queue.push(OutgoingMessage {
            client,
            delivery: M::DELIVERY,
            bytes: writer.to_bytes(),
        });
    }

    pub fn broadcast<'a, M: NetworkMessage>(
        &mut self,
        clients: impl IntoIterator<Item = &'a ClientId>,
        message: &M,
    ) {
        for client in clients {
            self.send(*client, message);
        }
    }

    /// Frames and queues an already serialized payload
    pub fn send_raw(
        &mut self,
        client: ClientId,
        message_type: MessageType,
        delivery: DeliveryClass,
        payload: &[u8],
    ) {
        let mut bytes = Vec::with_capacity(payload.len() + 1);
        bytes.push(message_type.id());
        bytes.extend_from_slice(payload);
        self.queue.push(OutgoingMessage {
            client,
            delivery,
            bytes,
        });
    }

    pub fn drain(&mut self) -> Drain<'_, OutgoingMessage> {
        self.queue.drain(..)
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutgoingMessage> {
        self.queue.iter()
    }
}
