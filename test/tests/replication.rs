/// End-to-end replication between a server and clients over the local hub

use snapsync_manager::{
    DespawnEvent, GainedOwnershipEvent, LostOwnershipEvent, ManagerError, NetworkConfig,
    NetworkManager, ParentChangedEvent, SpawnEvent,
};
use snapsync_shared::{
    ClientId, ObjectError, ObjectId, SpawnParams, VariableConfig, SERVER_CLIENT_ID,
};
use snapsync_test::{read_all, Controls, Stats, TestNetwork, CRATE, PLAYER};

fn network_with_clients(count: usize) -> (TestNetwork, Vec<ClientId>) {
    let mut network = TestNetwork::new(NetworkConfig::default());
    let ids = (0..count).map(|_| network.connect_client().1).collect();
    (network, ids)
}

fn stats(manager: &NetworkManager, object_id: ObjectId) -> &Stats {
    manager
        .object(object_id)
        .and_then(|object| object.behaviour::<Stats>())
        .expect("object has stats")
}

fn controls(manager: &NetworkManager, object_id: ObjectId) -> &Controls {
    manager
        .object(object_id)
        .and_then(|object| object.behaviour::<Controls>())
        .expect("object has controls")
}

fn controls_mut(manager: &mut NetworkManager, object_id: ObjectId) -> &mut Controls {
    manager
        .object_mut(object_id)
        .and_then(|object| object.behaviour_mut::<Controls>())
        .expect("object has controls")
}

#[cfg(test)]
mod spawn_tests {
    use super::*;

    #[test]
    fn spawn_reaches_every_connected_client() {
        let (mut network, ids) = network_with_clients(2);
        let tick = network.server.current_tick();
        let object = network.server.spawn(SpawnParams::new(CRATE));

        network.step_n(3);

        for index in 0..2 {
            let client = network.client_mut(index);
            assert!(client.sees(object));
            assert_eq!(client.manager.object(object).map(|o| o.archetype()), Some(CRATE));
            assert_eq!(client.manager.snapshot().tick_applied(&object), Some(tick));
            let mut events = client.take_events();
            assert_eq!(read_all::<SpawnEvent, _>(&mut events), vec![(object, CRATE)]);
        }
        let server_object = network.server.object(object).expect("object exists");
        assert_eq!(server_object.observers(), ids);
        assert_eq!(network.server.snapshot().num_spawns(), 0);
    }

    #[test]
    fn spawn_backlog_larger_than_one_snapshot_is_drained() {
        let (mut network, _) = network_with_clients(1);
        let objects: Vec<ObjectId> = (0..500)
            .map(|_| network.server.spawn(SpawnParams::new(CRATE)))
            .collect();

        assert!(network.step_until(20, |network| {
            objects.iter().all(|object| network.client(0).sees(*object))
        }));
        assert!(network.step_until(20, |network| network.server.snapshot().num_spawns() == 0));

        // a client joining the populated world gets the same backlog
        let (index, _) = network.connect_client();
        assert!(network.step_until(20, |network| {
            objects.iter().all(|object| network.client(index).sees(*object))
        }));
        assert_eq!(network.client(index).manager.directory().len(), 500);
    }

    #[test]
    fn late_joiner_receives_existing_objects_and_their_state() {
        let mut network = TestNetwork::new(NetworkConfig::default());
        let object = network.server.spawn(SpawnParams::new(CRATE));
        network
            .server
            .object_mut(object)
            .and_then(|o| o.behaviour_mut::<Stats>())
            .expect("object has stats")
            .health
            .set(55);
        network.step_n(2);

        let (index, _) = network.connect_client();
        network.step_n(3);

        let client = &network.client(index).manager;
        assert!(client.directory().is_spawned(object));
        assert_eq!(*stats(client, object).health, 55);
    }

    #[test]
    fn despawn_reaches_every_observer_and_is_pruned() {
        let (mut network, _) = network_with_clients(2);
        let object = network.server.spawn(SpawnParams::new(CRATE));
        network.step_n(3);

        network.server.despawn(object);
        assert!(network.server.object(object).is_none());
        network.step_n(3);

        for index in 0..2 {
            let client = network.client_mut(index);
            assert!(!client.sees(object));
            let mut events = client.take_events();
            assert_eq!(read_all::<DespawnEvent, _>(&mut events), vec![object]);
        }
        assert_eq!(network.server.snapshot().num_despawns(), 0);
    }

    #[test]
    fn despawn_lost_on_one_link_is_resent_until_acknowledged() {
        let (mut network, ids) = network_with_clients(2);
        let object = network.server.spawn(SpawnParams::new(CRATE));
        network.step_n(3);

        let blocked = network.client(1).connection;
        network.hub.set_blocked(blocked, true);
        let tick = network.server.current_tick();
        network.server.despawn(object);
        network.step_n(5);

        assert!(!network.client(0).sees(object));
        assert!(network.client(1).sees(object));
        assert_eq!(network.server.snapshot().despawn_targets(&object), vec![ids[1]]);

        network.hub.set_blocked(blocked, false);
        network.step_n(3);

        let client = network.client_mut(1);
        assert!(!client.sees(object));
        assert_eq!(client.manager.snapshot().tick_applied(&object), Some(tick));
        let mut events = client.take_events();
        assert!(read_all::<snapsync_manager::ErrorEvent, _>(&mut events).is_empty());
        assert_eq!(network.server.snapshot().num_despawns(), 0);
    }

    #[test]
    fn hidden_objects_leave_only_that_client() {
        let (mut network, ids) = network_with_clients(2);
        let object = network.server.spawn(SpawnParams::new(CRATE));
        network.step_n(3);

        network.server.try_hide(object, ids[1]).unwrap();
        network.step_n(3);
        assert!(network.client(0).sees(object));
        assert!(!network.client(1).sees(object));

        network.server.try_show(object, ids[1]).unwrap();
        network.step_n(3);
        assert!(network.client(1).sees(object));
        assert_eq!(
            network.server.object(object).map(|o| o.observers()),
            Some(ids.clone())
        );
    }

    #[test]
    fn show_right_after_hide_is_applied_on_the_next_tick() {
        let (mut network, ids) = network_with_clients(1);
        let object = network.server.spawn(SpawnParams::new(CRATE));
        network.step_n(3);

        network.server.try_hide(object, ids[0]).unwrap();
        network.server.try_show(object, ids[0]).unwrap();
        assert!(!network.server.object(object).expect("object exists").is_pending_observer(ids[0]));
        network.step_n(4);

        assert!(network.client(0).sees(object));
        let server_object = network.server.object(object).expect("object exists");
        assert!(server_object.is_observer(ids[0]));
    }

    #[test]
    fn invalid_visibility_changes_are_rejected() {
        let (mut network, ids) = network_with_clients(1);
        let object = network.server.spawn(SpawnParams::new(CRATE));

        assert_eq!(
            network.server.try_hide(object, SERVER_CLIENT_ID),
            Err(ManagerError::Object(ObjectError::CannotHideFromServer { object_id: object }))
        );
        assert_eq!(
            network.server.try_show(object, ids[0]),
            Err(ManagerError::Object(ObjectError::AlreadyVisible {
                object_id: object,
                client: ids[0]
            }))
        );
        network.server.try_hide(object, ids[0]).unwrap();
        assert_eq!(
            network.server.try_hide(object, ids[0]),
            Err(ManagerError::Object(ObjectError::AlreadyHidden {
                object_id: object,
                client: ids[0]
            }))
        );
    }
}

#[cfg(test)]
mod variable_tests {
    use super::*;

    #[test]
    fn server_writes_reach_observers() {
        let (mut network, _) = network_with_clients(2);
        let object = network.server.spawn(SpawnParams::new(CRATE));
        network.step_n(3);

        network
            .server
            .object_mut(object)
            .and_then(|o| o.behaviour_mut::<Stats>())
            .expect("object has stats")
            .name
            .set("barrel".to_string());
        network.step();

        for index in 0..2 {
            assert_eq!(stats(&network.client(index).manager, object).name.get(), "barrel");
        }
    }

    #[test]
    fn owner_only_fields_reach_only_the_owner() {
        let (mut network, ids) = network_with_clients(2);
        let object = network.server.spawn(SpawnParams::new(PLAYER).owner(ids[0]));
        controls_mut(&mut network.server, object).secret.set(7);
        network.step_n(3);

        assert_eq!(*controls(&network.client(0).manager, object).secret, 7);
        assert_eq!(*controls(&network.client(1).manager, object).secret, 0);

        controls_mut(&mut network.server, object).secret.set(8);
        network.step();
        assert_eq!(*controls(&network.client(0).manager, object).secret, 8);
        assert_eq!(*controls(&network.client(1).manager, object).secret, 0);
    }

    #[test]
    fn owner_writes_are_forwarded_to_the_other_observers() {
        let (mut network, ids) = network_with_clients(2);
        let object = network.server.spawn(SpawnParams::new(PLAYER).owner(ids[0]));
        network.step_n(3);

        controls_mut(&mut network.client_mut(0).manager, object).aim.set(5);
        network.step_n(2);

        assert_eq!(*controls(&network.server, object).aim, 5);
        assert_eq!(*controls(&network.client(1).manager, object).aim, 5);
        assert_eq!(*controls(&network.client(0).manager, object).aim, 5);
    }

    #[test]
    fn unprefixed_fields_replicate_both_ways() {
        let config = NetworkConfig {
            variables: VariableConfig {
                ensure_length_safety: false,
            },
            ..Default::default()
        };
        let mut network = TestNetwork::new(config.clone());
        let (owner, owner_id) = network.connect_client_with(config.clone());
        let (other, _) = network.connect_client_with(config);
        let object = network.server.spawn(SpawnParams::new(PLAYER).owner(owner_id));
        network.step_n(3);

        controls_mut(&mut network.client_mut(owner).manager, object).aim.set(-3);
        network
            .server
            .object_mut(object)
            .and_then(|o| o.behaviour_mut::<Stats>())
            .expect("object has stats")
            .health
            .set(7);
        network.step_n(2);

        assert_eq!(*controls(&network.server, object).aim, -3);
        assert_eq!(*controls(&network.client(other).manager, object).aim, -3);
        assert_eq!(*stats(&network.client(owner).manager, object).health, 7);
        assert_eq!(*stats(&network.client(other).manager, object).health, 7);
    }

    #[test]
    fn writes_without_permission_never_leave_the_client() {
        let (mut network, ids) = network_with_clients(2);
        let object = network.server.spawn(SpawnParams::new(PLAYER).owner(ids[0]));
        network.step_n(3);

        controls_mut(&mut network.client_mut(1).manager, object).aim.set(9);
        network
            .client_mut(1)
            .manager
            .object_mut(object)
            .and_then(|o| o.behaviour_mut::<Stats>())
            .expect("object has stats")
            .health
            .set(1);
        network.step_n(2);

        assert_eq!(*controls(&network.server, object).aim, 0);
        assert_eq!(*stats(&network.server, object).health, 100);
        assert_eq!(*controls(&network.client(0).manager, object).aim, 0);
    }
}

#[cfg(test)]
mod ownership_tests {
    use super::*;

    #[test]
    fn spawning_for_a_client_fires_its_gained_hook() {
        let (mut network, ids) = network_with_clients(2);
        let object = network.server.spawn(SpawnParams::new(PLAYER).owner(ids[0]));
        network.step_n(3);

        assert_eq!(controls(&network.client(0).manager, object).gained, 1);
        assert_eq!(controls(&network.client(1).manager, object).gained, 0);
        let mut events = network.client_mut(0).take_events();
        assert_eq!(read_all::<GainedOwnershipEvent, _>(&mut events), vec![object]);
    }

    #[test]
    fn ownership_moves_exclusively_between_clients() {
        let (mut network, ids) = network_with_clients(2);
        let object = network.server.spawn(SpawnParams::new(PLAYER));
        network.step_n(3);
        for index in 0..2 {
            network.client_mut(index).take_events();
        }

        network.server.try_change_ownership(object, ids[0]).unwrap();
        network.step();
        assert_eq!(network.server.directory().owned_by(ids[0]), vec![object]);
        assert!(network.server.directory().owned_by(SERVER_CLIENT_ID).is_empty());
        assert_eq!(controls(&network.client(0).manager, object).gained, 1);

        network.server.try_change_ownership(object, ids[1]).unwrap();
        network.step();

        assert_eq!(network.server.object(object).map(|o| o.owner()), Some(ids[1]));
        assert!(network.server.directory().owned_by(ids[0]).is_empty());
        assert_eq!(network.server.directory().owned_by(ids[1]), vec![object]);

        let first = controls(&network.client(0).manager, object);
        assert_eq!((first.gained, first.lost), (1, 1));
        let second = controls(&network.client(1).manager, object);
        assert_eq!((second.gained, second.lost), (1, 0));

        let mut events = network.client_mut(0).take_events();
        assert_eq!(read_all::<GainedOwnershipEvent, _>(&mut events), vec![object]);
        assert_eq!(read_all::<LostOwnershipEvent, _>(&mut events), vec![object]);
        let client = &network.client(1).manager;
        assert_eq!(client.object(object).map(|o| o.owner()), Some(ids[1]));
        assert_eq!(client.directory().owned_by(ids[1]), vec![object]);
    }

    #[test]
    fn ownership_is_sent_again_if_it_changed_before_the_spawn_was_acknowledged() {
        let (mut network, ids) = network_with_clients(1);
        let object = network.server.spawn(SpawnParams::new(PLAYER));
        network.server.try_change_ownership(object, ids[0]).unwrap();
        network.step_n(3);

        let client = &network.client(0).manager;
        assert_eq!(client.object(object).map(|o| o.owner()), Some(ids[0]));
        assert_eq!(controls(client, object).gained, 1);
    }

    #[test]
    fn leaving_client_takes_its_objects_unless_they_outlive_it() {
        let (mut network, ids) = network_with_clients(2);
        let owned = network
            .server
            .spawn(SpawnParams::new(PLAYER).owner(ids[0]).player_object());
        let kept = network
            .server
            .spawn(SpawnParams::new(CRATE).owner(ids[0]).dont_destroy_with_owner());
        network.step_n(3);
        assert_eq!(network.server.directory().player_object(ids[0]), Some(owned));

        network.client_mut(0).manager.shutdown(false);
        network.step_n(3);

        assert!(network.client(0).manager.directory().is_empty());
        assert_eq!(network.server.connected_clients(), vec![ids[1]]);
        assert!(network.server.object(owned).is_none());
        assert_eq!(network.server.directory().player_object(ids[0]), None);
        assert_eq!(network.server.object(kept).map(|o| o.owner()), Some(SERVER_CLIENT_ID));

        let remaining = &network.client(1).manager;
        assert!(!remaining.directory().contains(owned));
        assert_eq!(remaining.object(kept).map(|o| o.owner()), Some(SERVER_CLIENT_ID));
    }
}

#[cfg(test)]
mod parenting_tests {
    use super::*;

    #[test]
    fn parent_links_are_replicated() {
        let (mut network, _) = network_with_clients(1);
        let parent = network.server.spawn(SpawnParams::new(CRATE));
        let child = network.server.spawn(SpawnParams::new(CRATE).parent(parent));
        network.step_n(3);

        let client = &network.client(0).manager;
        assert_eq!(client.object(child).and_then(|o| o.parent()), Some(parent));
        assert_eq!(client.directory().orphan_count(), 0);

        assert!(matches!(
            network.server.try_set_parent(parent, Some(child), true),
            Err(ManagerError::Object(ObjectError::CyclicParent { .. }))
        ));

        network.client_mut(0).take_events();
        network.server.try_set_parent(child, None, true).unwrap();
        network.step();

        let client = network.client_mut(0);
        assert_eq!(client.manager.object(child).and_then(|o| o.parent()), None);
        let mut events = client.take_events();
        assert_eq!(read_all::<ParentChangedEvent, _>(&mut events), vec![(child, None)]);
    }

    #[test]
    fn despawning_a_parent_detaches_its_children_everywhere() {
        let (mut network, _) = network_with_clients(1);
        let parent = network.server.spawn(SpawnParams::new(CRATE));
        let child = network.server.spawn(SpawnParams::new(CRATE).parent(parent));
        network.step_n(3);

        network.server.despawn(parent);
        network.step_n(2);

        assert_eq!(network.server.object(child).and_then(|o| o.parent()), None);
        let client = &network.client(0).manager;
        assert!(!client.directory().contains(parent));
        assert_eq!(client.object(child).and_then(|o| o.parent()), None);
    }
}
