use std::ops::{Deref, DerefMut};

use snapsync_serde::{ByteReader, ByteWriter, Serde, SerdeErr};

use crate::{transport::DeliveryClass, types::ClientId};

/// Which clients may receive a variable's value
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReadPermission {
    #[default]
    Everyone,
    OwnerOnly,
}

/// Who may change a variable's value
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WritePermission {
    #[default]
    Server,
    Owner,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VariableSettings {
    pub read: ReadPermission,
    pub write: WritePermission,
    /// Variables sharing a delivery class are sent together
    pub delivery: DeliveryClass,
}

impl Default for VariableSettings {
    fn default() -> Self {
        Self {
            read: ReadPermission::Everyone,
            write: WritePermission::Server,
            delivery: DeliveryClass::ReliableSequenced,
        }
    }
}

impl VariableSettings {
    pub fn can_client_read(&self, client: ClientId, owner: ClientId) -> bool {
        match self.read {
            ReadPermission::Everyone => true,
            ReadPermission::OwnerOnly => client == owner,
        }
    }

    pub fn can_client_write(&self, client: ClientId, owner: ClientId) -> bool {
        match self.write {
            WritePermission::Server => false,
            WritePermission::Owner => client == owner,
        }
    }
}

/// Type-erased view of one replicated field
pub trait Variable {
    fn settings(&self) -> &VariableSettings;
    fn is_dirty(&self) -> bool;
    fn reset_dirty(&mut self);
    /// Marks the field dirty because `sender` changed it remotely. The
    /// change is not echoed back to `sender`.
    fn mark_received(&mut self, sender: ClientId);
    /// Client that caused the pending change, `None` for local changes
    fn dirty_origin(&self) -> Option<ClientId>;
    fn write_value(&self, writer: &mut ByteWriter);
    fn read_value(&mut self, reader: &mut ByteReader) -> Result<(), SerdeErr>;
}

/// A replicated value with dirty tracking. Mutating it through `set` or
/// `DerefMut` queues it for the next delta.
#[derive(Clone, Debug)]
pub struct NetworkVariable<T: Serde + Clone + PartialEq> {
    value: T,
    settings: VariableSettings,
    dirty: bool,
    origin: Option<ClientId>,
}

impl<T: Serde + Clone + PartialEq> NetworkVariable<T> {
    pub fn new(value: T) -> Self {
        Self::with_settings(value, VariableSettings::default())
    }

    pub fn with_settings(value: T, settings: VariableSettings) -> Self {
        Self {
            value,
            settings,
            dirty: false,
            origin: None,
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    /// Replaces the value, marking it dirty only if it changed
    pub fn set(&mut self, value: T) {
        if self.value != value {
            self.value = value;
            self.dirty = true;
            self.origin = None;
        }
    }
}

impl<T: Serde + Clone + PartialEq> Deref for NetworkVariable<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T: Serde + Clone + PartialEq> DerefMut for NetworkVariable<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.dirty = true;
        self.origin = None;
        &mut self.value
    }
}

impl<T: Serde + Clone + PartialEq> Variable for NetworkVariable<T> {
    fn settings(&self) -> &VariableSettings {
        &self.settings
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn reset_dirty(&mut self) {
        self.dirty = false;
        self.origin = None;
    }

    fn mark_received(&mut self, sender: ClientId) {
        self.dirty = true;
        self.origin = Some(sender);
    }

    fn dirty_origin(&self) -> Option<ClientId> {
        self.origin
    }

    fn write_value(&self, writer: &mut ByteWriter) {
        self.value.ser(writer);
    }

    fn read_value(&mut self, reader: &mut ByteReader) -> Result<(), SerdeErr> {
        self.value = T::de(reader)?;
        Ok(())
    }
}
