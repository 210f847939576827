use log::{debug, warn};

use snapsync_serde::{ByteReader, ByteWriter, ConstByteLength, Serde, SerdeErr};

use crate::{
    messages::{message_type::MessageType, outbox::Outbox},
    transport::DeliveryClass,
    types::{ClientId, HostType, ObjectId, Tick},
    variables::{
        config::VariableConfig, error::VariableError, network_variable::Variable,
        replicate::Replicate,
    },
};

/// Leading record of a variable delta message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VariableDeltaHeader {
    pub object_id: ObjectId,
    pub behaviour_index: u16,
    pub tick: Tick,
}

impl Serde for VariableDeltaHeader {
    fn ser(&self, writer: &mut ByteWriter) {
        writer.write_u64(self.object_id);
        writer.write_u16(self.behaviour_index);
        writer.write_i32(self.tick);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            object_id: reader.read_u64()?,
            behaviour_index: reader.read_u16()?,
            tick: reader.read_i32()?,
        })
    }

    fn byte_length(&self) -> usize {
        Self::const_byte_length()
    }
}

impl ConstByteLength for VariableDeltaHeader {
    fn const_byte_length() -> usize {
        8 + 2 + 4
    }
}

/// The object a delta pass works on, seen from the local peer
#[derive(Clone, Copy, Debug)]
pub struct DeltaScope {
    pub object_id: ObjectId,
    pub owner: ClientId,
    pub role: HostType,
    pub local_client: ClientId,
    pub tick: Tick,
}

impl DeltaScope {
    fn should_write(&self, variable: &dyn Variable, recipient: ClientId) -> bool {
        if !variable.is_dirty() {
            return false;
        }
        let settings = variable.settings();
        match self.role {
            HostType::Server => {
                settings.can_client_read(recipient, self.owner)
                    && variable.dirty_origin() != Some(recipient)
            }
            HostType::Client => settings.can_client_write(self.local_client, self.owner),
        }
    }
}

/// Who sent a delta, and what they are allowed to change
#[derive(Clone, Copy, Debug)]
pub struct ReadScope {
    pub object_id: ObjectId,
    pub owner: ClientId,
    pub role: HostType,
    pub sender: ClientId,
}

/// Writes and reads the field blocks of replicated behaviours.
///
/// A field block holds every variable of one behaviour in order. Each entry
/// is either a `u16` byte length followed by the value (zero meaning "not
/// written"), or with length safety off a `bool` presence flag followed by
/// the value.
pub struct VariableReplicator {
    config: VariableConfig,
}

impl VariableReplicator {
    pub fn new(config: VariableConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VariableConfig {
        &self.config
    }

    /// Queues one delta per recipient, behaviour and delivery class holding
    /// that class's dirty fields, then clears the dirty flag of every field
    /// that went to at least one recipient. Returns how many deltas were queued.
    pub fn write_deltas(
        &self,
        scope: DeltaScope,
        behaviours: &mut [Box<dyn Replicate>],
        recipients: &[ClientId],
        outbox: &mut Outbox,
    ) -> Result<usize, VariableError> {
        let mut queued = 0;
        for (index, behaviour) in behaviours.iter_mut().enumerate() {
            let variables = behaviour.variables();
            if !variables.iter().any(|variable| variable.is_dirty()) {
                continue;
            }
            let behaviour_index = u16::try_from(index).map_err(|_| VariableError::TooManyBehaviours {
                object_id: scope.object_id,
                index,
            })?;
            let header = VariableDeltaHeader {
                object_id: scope.object_id,
                behaviour_index,
                tick: scope.tick,
            };

            let mut written = vec![false; variables.len()];
            for recipient in recipients {
                for delivery in delivery_groups(&variables) {
                    let selected: Vec<bool> = variables
                        .iter()
                        .map(|variable| {
                            variable.settings().delivery == delivery
                                && scope.should_write(*variable, *recipient)
                        })
                        .collect();
                    if !selected.contains(&true) {
                        continue;
                    }

                    let mut writer = ByteWriter::new();
                    header.ser(&mut writer);
                    self.write_fields(&variables, &selected, &mut writer)?;
                    outbox.send_raw(*recipient, MessageType::VariableDelta, delivery, &writer.to_bytes());
                    queued += 1;

                    for (was_written, now_written) in written.iter_mut().zip(selected) {
                        *was_written |= now_written;
                    }
                }
            }

            let discard_unwritable = scope.role == HostType::Client;
            for (field_index, (variable, was_written)) in behaviour
                .variables_mut()
                .into_iter()
                .zip(written)
                .enumerate()
            {
                if was_written {
                    variable.reset_dirty();
                } else if discard_unwritable
                    && variable.is_dirty()
                    && !variable
                        .settings()
                        .can_client_write(scope.local_client, scope.owner)
                {
                    warn!(
                        "discarding local change to field {} of object {}: this client may not write it",
                        field_index, scope.object_id
                    );
                    variable.reset_dirty();
                }
            }
        }
        Ok(queued)
    }

    /// Queues every field `recipient` may read, regardless of dirty state,
    /// one reliable message per behaviour
    pub fn write_full_sync(
        &self,
        scope: DeltaScope,
        behaviours: &[Box<dyn Replicate>],
        recipient: ClientId,
        outbox: &mut Outbox,
    ) -> Result<usize, VariableError> {
        let mut queued = 0;
        for (index, behaviour) in behaviours.iter().enumerate() {
            let variables = behaviour.variables();
            if variables.is_empty() {
                continue;
            }
            let behaviour_index = u16::try_from(index).map_err(|_| VariableError::TooManyBehaviours {
                object_id: scope.object_id,
                index,
            })?;
            let selected = readable_by(&variables, recipient, scope.owner);

            let mut writer = ByteWriter::new();
            VariableDeltaHeader {
                object_id: scope.object_id,
                behaviour_index,
                tick: scope.tick,
            }
            .ser(&mut writer);
            self.write_fields(&variables, &selected, &mut writer)?;
            outbox.send_raw(
                recipient,
                MessageType::VariableDelta,
                DeliveryClass::ReliableSequenced,
                &writer.to_bytes(),
            );
            queued += 1;
        }
        Ok(queued)
    }

    /// Writes the behaviour count then one field block per behaviour holding
    /// every field `recipient` may read
    pub fn write_full_state(
        &self,
        behaviours: &[Box<dyn Replicate>],
        recipient: ClientId,
        owner: ClientId,
        writer: &mut ByteWriter,
    ) -> Result<(), VariableError> {
        writer.write_u16(behaviours.len() as u16);
        for behaviour in behaviours {
            let variables = behaviour.variables();
            let selected = readable_by(&variables, recipient, owner);
            self.write_fields(&variables, &selected, writer)?;
        }
        Ok(())
    }

    /// Reads a state written by `write_full_state` into freshly created behaviours
    pub fn read_full_state(
        &self,
        scope: ReadScope,
        behaviours: &mut [Box<dyn Replicate>],
        reader: &mut ByteReader,
    ) -> Result<(), VariableError> {
        let found = reader.read_u16()? as usize;
        if found != behaviours.len() {
            return Err(VariableError::BehaviourCountMismatch {
                object_id: scope.object_id,
                expected: behaviours.len(),
                found,
            });
        }
        for behaviour in behaviours.iter_mut() {
            self.read_fields(scope, behaviour.as_mut(), reader)?;
        }
        Ok(())
    }

    fn write_fields(
        &self,
        variables: &[&dyn Variable],
        selected: &[bool],
        writer: &mut ByteWriter,
    ) -> Result<(), VariableError> {
        for (variable, selected) in variables.iter().zip(selected) {
            if self.config.ensure_length_safety {
                let position = writer.write_u16_placeholder();
                if !*selected {
                    continue;
                }
                let start = writer.len();
                variable.write_value(writer);
                let length = writer.len() - start;
                let length = u16::try_from(length).map_err(|_| VariableError::FieldTooLarge { length })?;
                writer.patch_u16(position, length)?;
            } else {
                writer.write_bool(*selected);
                if *selected {
                    variable.write_value(writer);
                }
            }
        }
        Ok(())
    }

    /// Reads one field block into `behaviour`. Returns the number of fields
    /// applied.
    ///
    /// With length safety on, a field whose read does not end on its declared
    /// boundary, or that the sender may not write, is skipped with a warning.
    /// With it off, an unauthorised field aborts the rest of the block.
    pub fn read_fields(
        &self,
        scope: ReadScope,
        behaviour: &mut dyn Replicate,
        reader: &mut ByteReader,
    ) -> Result<usize, VariableError> {
        let mut applied = 0;
        for (field_index, variable) in behaviour.variables_mut().into_iter().enumerate() {
            let permitted = match scope.role {
                HostType::Server => variable.settings().can_client_write(scope.sender, scope.owner),
                HostType::Client => true,
            };

            if self.config.ensure_length_safety {
                let length = reader.read_u16()? as usize;
                if length == 0 {
                    continue;
                }
                let start = reader.position();
                let end = start + length;
                if !permitted {
                    warn!(
                        "client {} wrote field {} of object {} without permission, skipping it",
                        scope.sender, field_index, scope.object_id
                    );
                    reader.seek(end)?;
                    continue;
                }
                let read_ok = match variable.read_value(reader) {
                    Ok(()) => true,
                    Err(error) => {
                        warn!(
                            "failed to read field {} of object {}: {}",
                            field_index, scope.object_id, error
                        );
                        false
                    }
                };
                if reader.position() != end {
                    warn!(
                        "field {} of object {} declared {} bytes but {} were read, seeking to its end",
                        field_index,
                        scope.object_id,
                        length,
                        reader.position() - start
                    );
                    reader.seek(end)?;
                }
                if !read_ok {
                    continue;
                }
            } else {
                if !reader.read_bool()? {
                    continue;
                }
                if !permitted {
                    return Err(VariableError::UnauthorizedWrite {
                        object_id: scope.object_id,
                        field_index,
                        sender: scope.sender,
                    });
                }
                variable.read_value(reader)?;
            }

            if scope.role == HostType::Server {
                variable.mark_received(scope.sender);
            }
            applied += 1;
        }
        debug!("applied {} fields to object {}", applied, scope.object_id);
        Ok(applied)
    }
}

// Distinct delivery classes in order of first appearance
fn delivery_groups(variables: &[&dyn Variable]) -> Vec<DeliveryClass> {
    let mut groups = Vec::new();
    for variable in variables {
        let delivery = variable.settings().delivery;
        if !groups.contains(&delivery) {
            groups.push(delivery);
        }
    }
    groups
}

fn readable_by(variables: &[&dyn Variable], recipient: ClientId, owner: ClientId) -> Vec<bool> {
    variables
        .iter()
        .map(|variable| variable.settings().can_client_read(recipient, owner))
        .collect()
}
