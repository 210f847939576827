/// Snapshot delivery between one server engine and two client directories,
/// with packets delivered, dropped and duplicated by hand

use std::time::Duration;

use proptest::prelude::*;

use snapsync_shared::{
    ArchetypeRegistry, ByteReader, ByteWriter, ClientId, DespawnCommand, HostType,
    ObjectDirectory, Replicate, Serde, SnapshotConfig, SnapshotEngine, SnapshotHeader,
    SnapshotReceipt, SpawnCommand, Targets, SERVER_CLIENT_ID,
};

const CLIENT_A: ClientId = 1;
const CLIENT_B: ClientId = 2;
const ARCHETYPE: u32 = 42;
const NOW: Duration = Duration::ZERO;

fn empty() -> Vec<Box<dyn Replicate>> {
    Vec::new()
}

fn registry() -> ArchetypeRegistry {
    let mut registry = ArchetypeRegistry::new();
    registry.register(ARCHETYPE, empty);
    registry
}

struct Peer {
    engine: SnapshotEngine,
    directory: ObjectDirectory,
}

impl Peer {
    fn client() -> Self {
        Self {
            engine: SnapshotEngine::new(HostType::Client, SnapshotConfig::default()),
            directory: ObjectDirectory::new(HostType::Client, registry()),
        }
    }

    fn receive(&mut self, payload: &[u8]) -> SnapshotReceipt {
        let mut reader = ByteReader::new(payload);
        self.engine
            .handle_snapshot(SERVER_CLIENT_ID, &mut reader, &mut self.directory, NOW)
            .expect("snapshot is well formed")
    }

    /// Builds this client's snapshot at `tick`, carrying its ack
    fn ack(&mut self, tick: i32) -> Vec<u8> {
        self.engine.set_tick(tick);
        self.engine
            .try_send_snapshot(SERVER_CLIENT_ID, NOW)
            .expect("snapshot fits")
    }
}

struct Server {
    engine: SnapshotEngine,
    directory: ObjectDirectory,
}

impl Server {
    fn new() -> Self {
        Self {
            engine: SnapshotEngine::new(HostType::Server, SnapshotConfig::default()),
            directory: ObjectDirectory::new(HostType::Server, registry()),
        }
    }

    fn snapshot_for(&mut self, client: ClientId, tick: i32) -> Vec<u8> {
        self.engine.set_tick(tick);
        self.engine.try_send_snapshot(client, NOW).expect("snapshot fits")
    }

    fn receive(&mut self, client: ClientId, payload: &[u8]) -> SnapshotReceipt {
        let mut reader = ByteReader::new(payload);
        self.engine
            .handle_snapshot(client, &mut reader, &mut self.directory, NOW)
            .expect("snapshot is well formed")
    }
}

fn spawn_then_despawn() -> (Server, Peer, Peer) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut server = Server::new();
    let mut a = Peer::client();
    let mut b = Peer::client();

    server.engine.set_tick(10);
    server.engine.record_spawn(
        SpawnCommand::new(1, ARCHETYPE, SERVER_CLIENT_ID),
        Targets::Clients(vec![CLIENT_A, CLIENT_B]),
        &[],
    );
    let payload = server.snapshot_for(CLIENT_A, 10);
    a.receive(&payload);
    let payload = server.snapshot_for(CLIENT_B, 10);
    b.receive(&payload);

    server.engine.set_tick(15);
    server.engine.record_despawn(
        DespawnCommand::new(1),
        Targets::Clients(vec![CLIENT_A, CLIENT_B]),
        &[],
    );
    (server, a, b)
}

#[test]
fn spawn_materialises_the_object_with_its_archetype() {
    let mut server = Server::new();
    let mut a = Peer::client();

    server.engine.set_tick(10);
    server.engine.record_spawn(
        SpawnCommand::new(1, ARCHETYPE, SERVER_CLIENT_ID),
        Targets::Clients(vec![CLIENT_A, CLIENT_B]),
        &[],
    );
    let receipt = a.receive(&server.snapshot_for(CLIENT_A, 10));

    assert_eq!(receipt.header.current_tick, 10);
    assert_eq!(receipt.header.spawn_count, 1);
    assert_eq!(receipt.spawns_applied, 1);
    let object = a.directory.get(1).expect("object 1 was spawned");
    assert_eq!(object.archetype(), ARCHETYPE);
    assert!(object.is_spawned());
    assert_eq!(a.engine.tick_applied(&1), Some(10));
}

#[test]
fn dropped_despawn_is_applied_from_a_later_resend() {
    let (mut server, mut a, mut b) = spawn_then_despawn();

    a.receive(&server.snapshot_for(CLIENT_A, 15));
    assert!(!a.directory.contains(1));

    // the tick 15 snapshot for B is lost
    let _lost = server.snapshot_for(CLIENT_B, 15);
    assert!(b.directory.contains(1));

    let receipt = b.receive(&server.snapshot_for(CLIENT_B, 20));
    assert_eq!(receipt.header.despawn_count, 1);
    assert_eq!(receipt.spawns_applied, 0);
    assert_eq!(receipt.despawns_applied, 1);
    assert!(!b.directory.contains(1));
    assert_eq!(b.engine.tick_applied(&1), Some(15));
}

#[test]
fn duplicated_despawn_packet_is_a_no_op() {
    let (mut server, _a, mut b) = spawn_then_despawn();

    let payload = server.snapshot_for(CLIENT_B, 15);
    let first = b.receive(&payload);
    let second = b.receive(&payload);

    assert_eq!(first.despawns_applied, 1);
    assert_eq!(second.despawns_applied, 0);
    assert_eq!(second.spawns_applied, 0);
    assert!(b.directory.is_empty());
    assert_eq!(b.engine.tick_applied(&1), Some(15));
}

#[test]
fn commands_are_pruned_once_every_target_acked_past_them() {
    let (mut server, mut a, mut b) = spawn_then_despawn();
    assert_eq!(server.engine.num_spawns(), 1);
    assert_eq!(server.engine.num_despawns(), 1);

    a.receive(&server.snapshot_for(CLIENT_A, 15));
    // A saw tick 15: enough for the tick 10 spawn, not for the tick 15 despawn
    server.receive(CLIENT_A, &a.ack(15));
    assert_eq!(server.engine.spawn_targets(&1), vec![CLIENT_B]);
    assert_eq!(server.engine.despawn_targets(&1), vec![CLIENT_A, CLIENT_B]);

    b.receive(&server.snapshot_for(CLIENT_B, 20));
    server.receive(CLIENT_B, &b.ack(20));
    assert_eq!(server.engine.num_spawns(), 0);
    assert_eq!(server.engine.despawn_targets(&1), vec![CLIENT_A]);

    a.receive(&server.snapshot_for(CLIENT_A, 21));
    server.receive(CLIENT_A, &a.ack(21));
    assert_eq!(server.engine.num_despawns(), 0);
}

#[test]
fn child_spawned_before_its_parent_waits_as_an_orphan() {
    let mut server = Server::new();
    let mut a = Peer::client();

    let mut child = SpawnCommand::new(2, ARCHETYPE, SERVER_CLIENT_ID);
    child.parent = Some(1);
    server.engine.set_tick(3);
    server
        .engine
        .record_spawn(child, Targets::single(CLIENT_A), &[]);
    a.receive(&server.snapshot_for(CLIENT_A, 3));

    assert!(a.directory.is_orphan(2));
    assert!(!a.directory.is_spawned(2));
    assert_eq!(a.directory.get(2).and_then(|object| object.is_scene_object()), None);

    server.engine.set_tick(4);
    server.engine.record_spawn(
        SpawnCommand::new(1, ARCHETYPE, SERVER_CLIENT_ID),
        Targets::single(CLIENT_A),
        &[],
    );
    a.receive(&server.snapshot_for(CLIENT_A, 4));
    assert_eq!(a.directory.check_orphans(), 1);

    assert!(!a.directory.is_orphan(2));
    assert_eq!(a.directory.orphan_count(), 0);
    let child = a.directory.get(2).expect("child exists");
    assert!(child.is_spawned());
    assert_eq!(child.parent(), Some(1));
}

fn snapshot_with_spawn(current_tick: i32, command: &SpawnCommand) -> Vec<u8> {
    let mut writer = ByteWriter::new();
    SnapshotHeader {
        current_tick,
        last_received_tick: -1,
        spawn_count: 1,
        despawn_count: 0,
    }
    .ser(&mut writer);
    command.ser(&mut writer);
    writer.to_bytes()
}

proptest! {
    /// Re-delivering a spawn at the same or an earlier tick never creates a
    /// second object nor touches the first
    #[test]
    fn prop_spawn_application_is_idempotent(
        first in 0i32..1000,
        rewinds in prop::collection::vec(0i32..1000, 1..20),
    ) {
        let mut a = Peer::client();
        let mut command = SpawnCommand::new(9, ARCHETYPE, SERVER_CLIENT_ID);
        command.tick_issued = first;
        let receipt = a.receive(&snapshot_with_spawn(first, &command));
        prop_assert_eq!(receipt.spawns_applied, 1);

        for rewind in rewinds {
            let mut replay = command.clone();
            replay.tick_issued = first - rewind;
            let receipt = a.receive(&snapshot_with_spawn(first, &replay));
            prop_assert_eq!(receipt.spawns_applied, 0);
            prop_assert_eq!(a.directory.len(), 1);
            prop_assert_eq!(a.engine.tick_applied(&9), Some(first));
            prop_assert_eq!(a.directory.owned_by(SERVER_CLIENT_ID), vec![9]);
        }
    }
}
