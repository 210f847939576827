use snapsync_serde::{ByteReader, ByteWriter, ConstByteLength, Serde, SerdeErr};

use crate::types::Tick;

/// Leading record of every snapshot message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SnapshotHeader {
    /// Tick at which the sender built this snapshot
    pub current_tick: Tick,
    /// Latest snapshot tick the sender has received from the recipient
    pub last_received_tick: Tick,
    pub spawn_count: i32,
    pub despawn_count: i32,
}

impl Serde for SnapshotHeader {
    fn ser(&self, writer: &mut ByteWriter) {
        writer.write_i32(self.current_tick);
        writer.write_i32(self.last_received_tick);
        writer.write_i32(self.spawn_count);
        writer.write_i32(self.despawn_count);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            current_tick: reader.read_i32()?,
            last_received_tick: reader.read_i32()?,
            spawn_count: reader.read_i32()?,
            despawn_count: reader.read_i32()?,
        })
    }

    fn byte_length(&self) -> usize {
        Self::const_byte_length()
    }
}

impl ConstByteLength for SnapshotHeader {
    fn const_byte_length() -> usize {
        16
    }
}
