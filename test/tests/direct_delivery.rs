/// Spawns and despawns sent as one reliable message per observer instead of
/// through snapshots

use snapsync_manager::{DespawnEvent, NetworkConfig, SpawnEvent};
use snapsync_shared::{SpawnDelivery, SpawnParams};
use snapsync_test::{read_all, Stats, TestNetwork, CRATE};

fn direct_network() -> TestNetwork {
    TestNetwork::new(NetworkConfig {
        spawn_delivery: SpawnDelivery::DirectMessage,
        ..Default::default()
    })
}

#[test]
fn spawn_arrives_in_one_frame_with_its_state() {
    let mut network = direct_network();
    let (index, client_id) = network.connect_client();

    let object = network.server.spawn(SpawnParams::new(CRATE));
    network
        .server
        .object_mut(object)
        .and_then(|o| o.behaviour_mut::<Stats>())
        .expect("object has stats")
        .health
        .set(60);
    assert_eq!(network.server.object(object).map(|o| o.observers()), Some(vec![client_id]));
    network.step();

    let client = network.client_mut(index);
    assert!(client.sees(object));
    let stats = client
        .manager
        .object(object)
        .and_then(|o| o.behaviour::<Stats>())
        .expect("object has stats");
    assert_eq!(*stats.health, 60);
    let mut events = client.take_events();
    assert_eq!(read_all::<SpawnEvent, _>(&mut events), vec![(object, CRATE)]);
    assert_eq!(network.server.snapshot().num_spawns(), 0);
}

#[test]
fn late_joiners_get_existing_objects_directly() {
    let mut network = direct_network();
    let object = network.server.spawn(SpawnParams::new(CRATE));
    network.step();

    let (index, _) = network.connect_client();
    network.step();
    assert!(network.client(index).sees(object));
}

#[test]
fn despawn_arrives_in_one_frame() {
    let mut network = direct_network();
    let (index, _) = network.connect_client();
    let object = network.server.spawn(SpawnParams::new(CRATE));
    network.step();

    network.server.despawn(object);
    network.step();

    let client = network.client_mut(index);
    assert!(!client.sees(object));
    let mut events = client.take_events();
    assert_eq!(read_all::<DespawnEvent, _>(&mut events), vec![object]);
    assert_eq!(network.server.snapshot().num_despawns(), 0);
}

#[test]
fn direct_and_snapshot_delivery_end_in_the_same_state() {
    let mut direct = direct_network();
    let mut snapshot = TestNetwork::new(NetworkConfig::default());
    for network in [&mut direct, &mut snapshot] {
        network.connect_client();
        network.connect_client();
        let kept = network.server.spawn(SpawnParams::new(CRATE));
        let gone = network.server.spawn(SpawnParams::new(CRATE).parent(kept));
        network.step_n(3);
        network.server.despawn(gone);
        network.server.try_hide(kept, 2).unwrap();
        network.step_n(3);
    }

    for index in 0..2 {
        let direct_ids = direct.client(index).manager.directory().object_ids();
        let snapshot_ids = snapshot.client(index).manager.directory().object_ids();
        assert_eq!(direct_ids, snapshot_ids);
    }
    assert_eq!(direct.client(0).manager.directory().len(), 1);
    assert!(direct.client(1).manager.directory().is_empty());
}
