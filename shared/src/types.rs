use snapsync_serde::{ByteReader, ByteWriter, ConstByteLength, Serde, SerdeErr};

/// Logical identifier of a connected peer
pub type ClientId = u64;
/// Identifier of a replicated object, unique among live objects
pub type ObjectId = u64;
/// Opaque identifier handed out by the transport
pub type ConnectionId = u64;
/// Identifies the factory used to instantiate an object remotely
pub type ArchetypeHash = u32;
pub type Tick = i32;

/// Tick value meaning "not yet ticked"
pub const NO_TICK: Tick = -1;
/// The server always uses this client id, also for its own local client in host mode
pub const SERVER_CLIENT_ID: ClientId = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HostType {
    Server,
    Client,
}

impl HostType {
    pub fn invert(self) -> Self {
        match self {
            HostType::Server => HostType::Client,
            HostType::Client => HostType::Server,
        }
    }
}

/// Position, rotation and scale captured when a spawn or parent change is issued
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: [f32; 3],
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        position: [0.0; 3],
        rotation: [0.0, 0.0, 0.0, 1.0],
        scale: [1.0; 3],
    };

    pub fn from_position(position: [f32; 3]) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Serde for Transform {
    fn ser(&self, writer: &mut ByteWriter) {
        self.position.ser(writer);
        self.rotation.ser(writer);
        self.scale.ser(writer);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            position: reader.read()?,
            rotation: reader.read()?,
            scale: reader.read()?,
        })
    }

    fn byte_length(&self) -> usize {
        Self::const_byte_length()
    }
}

impl ConstByteLength for Transform {
    fn const_byte_length() -> usize {
        <[f32; 3]>::const_byte_length() * 2 + <[f32; 4]>::const_byte_length()
    }
}
