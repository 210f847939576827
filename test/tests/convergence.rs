/// Random spawn, despawn, visibility and write sequences over a lossy link
/// always settle with every client mirroring what the server shows it

use proptest::prelude::*;

use snapsync_manager::NetworkConfig;
use snapsync_shared::{ClientId, ObjectId, SpawnParams};
use snapsync_test::{LinkConditionerConfig, Stats, TestNetwork, CRATE};

const CLIENTS: usize = 3;
const SETTLE_FRAMES: usize = 200;

#[derive(Clone, Debug)]
enum Op {
    Spawn,
    Despawn(usize),
    Hide(usize, usize),
    Show(usize, usize),
    SetHealth(usize, u32),
    Step(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Spawn),
        1 => any::<usize>().prop_map(Op::Despawn),
        2 => (any::<usize>(), 0..CLIENTS).prop_map(|(object, client)| Op::Hide(object, client)),
        2 => (any::<usize>(), 0..CLIENTS).prop_map(|(object, client)| Op::Show(object, client)),
        2 => (any::<usize>(), any::<u32>()).prop_map(|(object, health)| Op::SetHealth(object, health)),
        3 => (1usize..4).prop_map(Op::Step),
    ]
}

fn pick(objects: &[ObjectId], index: usize) -> Option<ObjectId> {
    if objects.is_empty() {
        None
    } else {
        Some(objects[index % objects.len()])
    }
}

fn health(network: &TestNetwork, index: Option<usize>, object_id: ObjectId) -> Option<u32> {
    let manager = match index {
        Some(index) => &network.client(index).manager,
        None => &network.server,
    };
    manager
        .object(object_id)
        .and_then(|object| object.behaviour::<Stats>())
        .map(|stats| *stats.health)
}

/// Whether every client holds exactly the objects it observes on the server,
/// with the server's values
fn converged(network: &TestNetwork, ids: &[ClientId]) -> bool {
    let server = network.server.directory();
    ids.iter().enumerate().all(|(index, client)| {
        let expected: Vec<ObjectId> = server
            .object_ids()
            .into_iter()
            .filter(|object_id| {
                server
                    .get(*object_id)
                    .is_some_and(|object| object.is_observer(*client))
            })
            .collect();
        let pending = server.object_ids().into_iter().any(|object_id| {
            server
                .get(object_id)
                .is_some_and(|object| object.is_pending_observer(*client))
        });
        !pending
            && network.client(index).manager.directory().object_ids() == expected
            && expected
                .iter()
                .all(|object_id| health(network, Some(index), *object_id) == health(network, None, *object_id))
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_clients_converge_under_loss(
        seed in any::<u64>(),
        ops in prop::collection::vec(op(), 1..40),
    ) {
        let mut network = TestNetwork::lossy(
            NetworkConfig::default(),
            LinkConditionerConfig::lossy(),
            seed,
        );
        let ids: Vec<ClientId> = (0..CLIENTS).map(|_| network.connect_client().1).collect();
        let mut objects: Vec<ObjectId> = Vec::new();

        for op in ops {
            match op {
                Op::Spawn => objects.push(network.server.spawn(SpawnParams::new(CRATE))),
                Op::Despawn(index) => {
                    if let Some(object_id) = pick(&objects, index) {
                        network.server.despawn(object_id);
                        objects.retain(|object| *object != object_id);
                    }
                }
                Op::Hide(index, client) => {
                    if let Some(object_id) = pick(&objects, index) {
                        let _ = network.server.try_hide(object_id, ids[client]);
                    }
                }
                Op::Show(index, client) => {
                    if let Some(object_id) = pick(&objects, index) {
                        let _ = network.server.try_show(object_id, ids[client]);
                    }
                }
                Op::SetHealth(index, value) => {
                    if let Some(object_id) = pick(&objects, index) {
                        if let Some(stats) = network
                            .server
                            .object_mut(object_id)
                            .and_then(|object| object.behaviour_mut::<Stats>())
                        {
                            stats.health.set(value);
                        }
                    }
                }
                Op::Step(frames) => network.step_n(frames),
            }
        }

        // lets shows deferred by a hide in the same tick go out first
        network.step_n(2);
        let settled = network.step_until(SETTLE_FRAMES, |network| converged(network, &ids));
        prop_assert!(settled, "clients did not converge after {} frames", SETTLE_FRAMES);
        for index in 0..CLIENTS {
            prop_assert_eq!(network.client(index).manager.directory().orphan_count(), 0);
        }
    }
}
