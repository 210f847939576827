use std::{
    collections::{HashMap, VecDeque},
    time::Duration,
};

use log::{debug, warn};

use snapsync_serde::{ByteReader, ByteWriter, ConstByteLength, Serde};

use crate::{
    connection::rtt_tracker::{RttStats, RttTracker},
    messages::{message_type::MessageType, outbox::Outbox},
    snapshot::{
        commands::{DespawnCommand, SpawnCommand, Targets},
        config::SnapshotConfig,
        error::SnapshotError,
        header::SnapshotHeader,
    },
    transport::DeliveryClass,
    types::{ClientId, HostType, ObjectId, Tick, NO_TICK, SERVER_CLIENT_ID},
};

pub const SENTINEL_BEFORE: u16 = 0x4246;
pub const SENTINEL_AFTER: u16 = 0x89CE;

// How many snapshot ticks a target remembers having been sent in
const MAX_SENT_TICKS: usize = 32;

/// Seam between the snapshot engine and whatever owns the local objects
pub trait SnapshotApplier {
    fn apply_spawn(&mut self, sender: ClientId, command: &SpawnCommand);
    fn apply_despawn(&mut self, sender: ClientId, command: &DespawnCommand);
}

/// Acknowledgment state kept per remote peer
pub struct ClientAckRecord {
    /// Latest snapshot tick received from this peer, echoed back in our headers
    pub last_received_tick: Tick,
    /// Per live object, the issuing tick of the spawn this peer acknowledged.
    /// Entries leave once the peer acknowledges the despawn.
    pub spawn_despawn_ack: HashMap<ObjectId, Tick>,
    next_spawn_index: usize,
    next_despawn_index: usize,
}

impl ClientAckRecord {
    fn new() -> Self {
        Self {
            last_received_tick: NO_TICK,
            spawn_despawn_ack: HashMap::new(),
            next_spawn_index: 0,
            next_despawn_index: 0,
        }
    }
}

/// Outcome of reading one snapshot
#[derive(Debug)]
pub struct SnapshotReceipt {
    pub header: SnapshotHeader,
    pub spawns_applied: usize,
    pub despawns_applied: usize,
    /// Spawn commands the sender has now acknowledged
    pub acknowledged_spawns: Vec<SpawnCommand>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SnapshotCounters {
    pub snapshots_sent: u64,
    pub snapshots_received: u64,
    /// Spawn commands recorded, counted once per target
    pub spawns_recorded: u64,
    /// Despawn commands recorded, counted once per target
    pub despawns_recorded: u64,
    pub bytes_sent: u64,
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct AppliedStamp {
    tick: Tick,
    despawn: bool,
}

struct Target {
    client: ClientId,
    sent_ticks: VecDeque<Tick>,
}

impl Target {
    fn new(client: ClientId) -> Self {
        Self {
            client,
            sent_ticks: VecDeque::new(),
        }
    }

    fn note_sent(&mut self, tick: Tick) {
        if self.sent_ticks.len() == MAX_SENT_TICKS {
            self.sent_ticks.pop_front();
        }
        self.sent_ticks.push_back(tick);
    }
}

struct BufferedSpawn {
    command: SpawnCommand,
    targets: Vec<Target>,
    times_written: u32,
}

struct BufferedDespawn {
    command: DespawnCommand,
    targets: Vec<Target>,
}

fn has_target(targets: &[Target], client: ClientId) -> bool {
    targets.iter().any(|target| target.client == client)
}

fn note_sent(targets: &mut [Target], client: ClientId, tick: Tick) {
    if let Some(target) = targets.iter_mut().find(|target| target.client == client) {
        target.note_sent(tick);
    }
}

// Returns whether `client` was removed from `targets`. Only a command carried
// by the acknowledged snapshot is released.
fn remove_target(targets: &mut Vec<Target>, client: ClientId, acked_tick: Tick) -> bool {
    let Some(position) = targets.iter().position(|target| target.client == client) else {
        return false;
    };
    if !targets[position].sent_ticks.contains(&acked_tick) {
        return false;
    }
    targets.swap_remove(position);
    true
}

// Exponential back-off: the second write happens immediately, then after
// 2 ticks, 4 ticks and so on
fn should_write_spawn(current_tick: Tick, spawn: &BufferedSpawn) -> bool {
    if current_tick < spawn.command.tick_issued {
        return false;
    }
    let diff = (current_tick - spawn.command.tick_issued).min(62);
    (1i64 << diff) > i64::from(spawn.times_written) - 1
}

/// Accumulates tick-stamped spawn/despawn commands and keeps resending them
/// to every target until that target acknowledges a later tick.
pub struct SnapshotEngine {
    config: SnapshotConfig,
    host_type: HostType,
    current_tick: Tick,
    last_snapshot_tick: Tick,
    spawns: Vec<BufferedSpawn>,
    despawns: Vec<BufferedDespawn>,
    clients: HashMap<ClientId, ClientAckRecord>,
    rtts: HashMap<ClientId, RttTracker>,
    tick_applied: HashMap<ObjectId, AppliedStamp>,
    counters: SnapshotCounters,
}

impl SnapshotEngine {
    pub fn new(host_type: HostType, config: SnapshotConfig) -> Self {
        Self {
            config,
            host_type,
            current_tick: NO_TICK,
            last_snapshot_tick: NO_TICK,
            spawns: Vec::new(),
            despawns: Vec::new(),
            clients: HashMap::new(),
            rtts: HashMap::new(),
            tick_applied: HashMap::new(),
            counters: SnapshotCounters::default(),
        }
    }

    pub fn host_type(&self) -> HostType {
        self.host_type
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    pub fn current_tick(&self) -> Tick {
        self.current_tick
    }

    /// Follows the tick clock, new commands are stamped with this tick
    pub fn set_tick(&mut self, tick: Tick) {
        self.current_tick = tick;
    }

    fn resolve_targets(&self, targets: Targets, connected: &[ClientId]) -> Vec<ClientId> {
        match targets {
            Targets::Clients(clients) => clients,
            Targets::Default => match self.host_type {
                HostType::Server => connected
                    .iter()
                    .copied()
                    .filter(|client| *client != SERVER_CLIENT_ID)
                    .collect(),
                HostType::Client => vec![SERVER_CLIENT_ID],
            },
        }
    }

    /// Buffers a spawn stamped with the current tick. Returns the number of
    /// targets, zero meaning nothing was recorded.
    pub fn record_spawn(
        &mut self,
        mut command: SpawnCommand,
        targets: Targets,
        connected: &[ClientId],
    ) -> usize {
        let targets = self.resolve_targets(targets, connected);
        if targets.is_empty() {
            return 0;
        }
        command.tick_issued = self.current_tick;
        let count = targets.len();
        self.counters.spawns_recorded += count as u64;
        self.spawns.push(BufferedSpawn {
            command,
            targets: targets.into_iter().map(Target::new).collect(),
            times_written: 0,
        });
        count
    }

    /// Buffers a despawn stamped with the current tick. Returns the number of
    /// targets, zero meaning nothing was recorded.
    pub fn record_despawn(
        &mut self,
        mut command: DespawnCommand,
        targets: Targets,
        connected: &[ClientId],
    ) -> usize {
        let targets = self.resolve_targets(targets, connected);
        if targets.is_empty() {
            return 0;
        }
        command.tick_issued = self.current_tick;
        let count = targets.len();
        self.counters.despawns_recorded += count as u64;
        self.despawns.push(BufferedDespawn {
            command,
            targets: targets.into_iter().map(Target::new).collect(),
        });
        count
    }

    /// Sends one snapshot per peer whenever the tick moved since the last call.
    /// A server sends to every connected client but itself, a connected
    /// client sends to the server.
    pub fn tick(
        &mut self,
        connected: &[ClientId],
        is_connected_client: bool,
        now: Duration,
        outbox: &mut Outbox,
    ) -> bool {
        if self.current_tick == NO_TICK || self.current_tick == self.last_snapshot_tick {
            return false;
        }
        self.last_snapshot_tick = self.current_tick;

        match self.host_type {
            HostType::Server => {
                for client in connected {
                    if *client != SERVER_CLIENT_ID {
                        self.send_snapshot(*client, now, outbox);
                    }
                }
            }
            HostType::Client => {
                if is_connected_client {
                    self.send_snapshot(SERVER_CLIENT_ID, now, outbox);
                }
            }
        }
        true
    }

    /// Builds and queues the snapshot for `client`
    ///
    /// # Panics
    ///
    /// Panics if the snapshot does not fit in the buffer it was sized for,
    /// which means the size computation is wrong, or if `max_message_size`
    /// cannot even hold the snapshot header.
    /// Consider using `try_send_snapshot` for non-panicking error handling.
    pub fn send_snapshot(&mut self, client: ClientId, now: Duration, outbox: &mut Outbox) {
        match self.try_send_snapshot(client, now) {
            Ok(payload) => {
                outbox.send_raw(client, MessageType::Snapshot, DeliveryClass::Unreliable, &payload)
            }
            Err(error) => panic!("Fatal snapshot error for client {}: {}", client, error),
        }
    }

    /// Builds the snapshot payload for `client`. Outstanding commands beyond
    /// the record budget are left for later snapshots.
    ///
    /// Returns an error if the payload cannot be sized to fit.
    pub fn try_send_snapshot(&mut self, client: ClientId, now: Duration) -> Result<Vec<u8>, SnapshotError> {
        let current_tick = self.current_tick;
        let sentinel_bytes = if self.config.use_sentinels { 4 } else { 0 };
        let framing = SnapshotHeader::const_byte_length() + sentinel_bytes;
        let record = self.clients.entry(client).or_insert_with(ClientAckRecord::new);
        let (spawn_indices, despawn_indices) = select_commands(
            &self.config,
            self.config.record_budget(framing),
            current_tick,
            client,
            &self.spawns,
            &self.despawns,
            record,
        );

        let required = framing
            + spawn_indices.len() * SpawnCommand::const_byte_length()
            + despawn_indices.len() * DespawnCommand::const_byte_length();
        if required > self.config.max_message_size {
            return Err(SnapshotError::BufferSizing {
                required,
                capacity: self.config.max_message_size,
            });
        }

        let header = SnapshotHeader {
            current_tick,
            last_received_tick: record.last_received_tick,
            spawn_count: spawn_indices.len() as i32,
            despawn_count: despawn_indices.len() as i32,
        };

        let mut writer = ByteWriter::with_limit(required);
        if self.config.use_sentinels {
            writer.write_u16(SENTINEL_BEFORE);
        }
        header.ser(&mut writer);
        for index in &spawn_indices {
            self.spawns[*index].command.ser(&mut writer);
        }
        for index in &despawn_indices {
            self.despawns[*index].command.ser(&mut writer);
        }
        if self.config.use_sentinels {
            writer.write_u16(SENTINEL_AFTER);
        }
        let written = writer.len();
        let payload = writer.try_finish().map_err(|_| SnapshotError::BufferSizing {
            required,
            capacity: written,
        })?;

        for index in spawn_indices {
            let spawn = &mut self.spawns[index];
            spawn.times_written += 1;
            note_sent(&mut spawn.targets, client, current_tick);
        }
        for index in despawn_indices {
            note_sent(&mut self.despawns[index].targets, client, current_tick);
        }

        if current_tick >= 0 {
            self.rtts
                .entry(client)
                .or_default()
                .notify_send(current_tick as u32, now);
        }
        self.counters.snapshots_sent += 1;
        self.counters.bytes_sent += payload.len() as u64;

        Ok(payload)
    }

    /// Reads a snapshot from `sender`, applies whatever is newer than what
    /// was already applied, then prunes what the sender acknowledged.
    ///
    /// The whole message is decoded before anything is applied, so a
    /// malformed snapshot leaves every piece of state untouched.
    pub fn handle_snapshot<A: SnapshotApplier>(
        &mut self,
        sender: ClientId,
        reader: &mut ByteReader,
        applier: &mut A,
        now: Duration,
    ) -> Result<SnapshotReceipt, SnapshotError> {
        if self.config.use_sentinels {
            let sentinel = reader.read_u16()?;
            if sentinel != SENTINEL_BEFORE {
                warn!("snapshot integrity check failed before body, from client {}", sender);
            }
        }
        let header = SnapshotHeader::de(reader)?;
        let spawns = read_records::<SpawnCommand>(reader, header.spawn_count, "spawn")?;
        let despawns = read_records::<DespawnCommand>(reader, header.despawn_count, "despawn")?;
        if self.config.use_sentinels {
            let sentinel = reader.read_u16()?;
            if sentinel != SENTINEL_AFTER {
                warn!("snapshot integrity check failed after body, from client {}", sender);
            }
        }

        self.counters.snapshots_received += 1;
        let record = self.clients.entry(sender).or_insert_with(ClientAckRecord::new);
        if header.current_tick > record.last_received_tick {
            record.last_received_tick = header.current_tick;
        }
        if header.last_received_tick >= 0 {
            self.rtts
                .entry(sender)
                .or_default()
                .notify_ack(header.last_received_tick as u32, now);
        }

        let mut spawns_applied = 0;
        for command in &spawns {
            if self.try_mark_applied(command.object_id, command.tick_issued, false) {
                applier.apply_spawn(sender, command);
                spawns_applied += 1;
            } else {
                debug!(
                    "skipping stale spawn of object {} issued at tick {}",
                    command.object_id, command.tick_issued
                );
            }
        }
        let mut despawns_applied = 0;
        for command in &despawns {
            if self.try_mark_applied(command.object_id, command.tick_issued, true) {
                applier.apply_despawn(sender, command);
                despawns_applied += 1;
            } else {
                debug!(
                    "skipping stale despawn of object {} issued at tick {}",
                    command.object_id, command.tick_issued
                );
            }
        }

        let acknowledged_spawns = self.prune(sender, header.last_received_tick);

        Ok(SnapshotReceipt {
            header,
            spawns_applied,
            despawns_applied,
            acknowledged_spawns,
        })
    }

    /// Records that a command for `object_id` issued at `tick` is being
    /// applied. Returns false if an equal or newer command was already
    /// applied. At equal ticks a despawn supersedes a spawn.
    pub fn try_mark_applied(&mut self, object_id: ObjectId, tick: Tick, despawn: bool) -> bool {
        let stamp = AppliedStamp { tick, despawn };
        match self.tick_applied.get(&object_id) {
            Some(applied) if stamp <= *applied => false,
            _ => {
                self.tick_applied.insert(object_id, stamp);
                true
            }
        }
    }

    /// Tick of the latest command applied for `object_id`
    pub fn tick_applied(&self, object_id: &ObjectId) -> Option<Tick> {
        self.tick_applied.get(object_id).map(|stamp| stamp.tick)
    }

    fn prune(&mut self, sender: ClientId, acked_tick: Tick) -> Vec<SpawnCommand> {
        let mut acknowledged = Vec::new();
        if acked_tick == NO_TICK {
            return acknowledged;
        }
        let record = self.clients.entry(sender).or_insert_with(ClientAckRecord::new);

        let mut index = 0;
        while index < self.spawns.len() {
            let spawn = &mut self.spawns[index];
            if spawn.command.tick_issued < acked_tick
                && remove_target(&mut spawn.targets, sender, acked_tick)
            {
                record
                    .spawn_despawn_ack
                    .insert(spawn.command.object_id, spawn.command.tick_issued);
                acknowledged.push(spawn.command.clone());
                if spawn.targets.is_empty() {
                    self.spawns.swap_remove(index);
                    continue;
                }
            }
            index += 1;
        }

        let mut index = 0;
        while index < self.despawns.len() {
            let despawn = &mut self.despawns[index];
            if despawn.command.tick_issued < acked_tick
                && remove_target(&mut despawn.targets, sender, acked_tick)
            {
                // the object is gone for this peer
                record.spawn_despawn_ack.remove(&despawn.command.object_id);
                if despawn.targets.is_empty() {
                    self.despawns.swap_remove(index);
                    continue;
                }
            }
            index += 1;
        }

        acknowledged
    }

    /// Forgets a disconnected peer: its ack record, its RTT window and its
    /// place in every buffered target list
    pub fn remove_client(&mut self, client: &ClientId) {
        self.clients.remove(client);
        self.rtts.remove(client);

        self.spawns.retain_mut(|spawn| {
            spawn.targets.retain(|target| target.client != *client);
            !spawn.targets.is_empty()
        });
        self.despawns.retain_mut(|despawn| {
            despawn.targets.retain(|target| target.client != *client);
            !despawn.targets.is_empty()
        });
    }

    /// Drops every buffered command, ack record and applied tick
    pub fn clear(&mut self) {
        self.spawns.clear();
        self.despawns.clear();
        self.clients.clear();
        self.rtts.clear();
        self.tick_applied.clear();
        self.current_tick = NO_TICK;
        self.last_snapshot_tick = NO_TICK;
    }

    pub fn num_spawns(&self) -> usize {
        self.spawns.len()
    }

    pub fn num_despawns(&self) -> usize {
        self.despawns.len()
    }

    /// Clients that still have to acknowledge a buffered spawn of `object_id`
    pub fn spawn_targets(&self, object_id: &ObjectId) -> Vec<ClientId> {
        self.spawns
            .iter()
            .filter(|spawn| spawn.command.object_id == *object_id)
            .flat_map(|spawn| spawn.targets.iter().map(|target| target.client))
            .collect()
    }

    /// Clients that still have to acknowledge a buffered despawn of `object_id`
    pub fn despawn_targets(&self, object_id: &ObjectId) -> Vec<ClientId> {
        self.despawns
            .iter()
            .filter(|despawn| despawn.command.object_id == *object_id)
            .flat_map(|despawn| despawn.targets.iter().map(|target| target.client))
            .collect()
    }

    pub fn ack_record(&self, client: &ClientId) -> Option<&ClientAckRecord> {
        self.clients.get(client)
    }

    pub fn rtt(&self, client: &ClientId) -> RttStats {
        self.rtts
            .get(client)
            .map(RttTracker::rtt)
            .unwrap_or_default()
    }

    /// Returns the counters accumulated since the last call and resets them
    pub fn take_counters(&mut self) -> SnapshotCounters {
        std::mem::take(&mut self.counters)
    }
}

fn read_records<T: Serde + ConstByteLength>(
    reader: &mut ByteReader,
    count: i32,
    kind: &'static str,
) -> Result<Vec<T>, SnapshotError> {
    let remaining = reader.remaining();
    if count < 0 || count as usize * T::const_byte_length() > remaining {
        return Err(SnapshotError::InvalidRecordCount {
            kind,
            count,
            remaining,
        });
    }
    let mut records = Vec::with_capacity(count as usize);
    for _ in 0..count {
        records.push(T::de(reader)?);
    }
    Ok(records)
}

// Picks which buffered commands go into the next snapshot for `client`.
// Commands are visited round-robin so that a backlog larger than the budget
// is eventually drained.
fn select_commands(
    config: &SnapshotConfig,
    budget: usize,
    current_tick: Tick,
    client: ClientId,
    spawns: &[BufferedSpawn],
    despawns: &[BufferedDespawn],
    record: &mut ClientAckRecord,
) -> (Vec<usize>, Vec<usize>) {
    let mut used = 0;
    let mut over_budget = false;

    let mut spawn_indices = Vec::new();
    let spawn_count = spawns.len();
    let spawn_start = if spawn_count > 0 {
        record.next_spawn_index % spawn_count
    } else {
        0
    };
    for step in 0..spawn_count {
        let index = (spawn_start + step) % spawn_count;
        let spawn = &spawns[index];
        if !has_target(&spawn.targets, client) {
            continue;
        }
        if config.resend_backoff && !should_write_spawn(current_tick, spawn) {
            continue;
        }
        if used + SpawnCommand::const_byte_length() > budget {
            over_budget = true;
            record.next_spawn_index = index;
            break;
        }
        used += SpawnCommand::const_byte_length();
        spawn_indices.push(index);
    }

    let mut despawn_indices = Vec::new();
    if over_budget {
        // despawns wait until every pending spawn fit, so a despawn never
        // overtakes the spawn it cancels
        return (spawn_indices, despawn_indices);
    }
    let despawn_count = despawns.len();
    let despawn_start = if despawn_count > 0 {
        record.next_despawn_index % despawn_count
    } else {
        0
    };
    for step in 0..despawn_count {
        let index = (despawn_start + step) % despawn_count;
        let despawn = &despawns[index];
        if !has_target(&despawn.targets, client) {
            continue;
        }
        if used + DespawnCommand::const_byte_length() > budget {
            record.next_despawn_index = index;
            break;
        }
        used += DespawnCommand::const_byte_length();
        despawn_indices.push(index);
    }

    (spawn_indices, despawn_indices)
}
