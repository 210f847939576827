//! In-memory transport for end-to-end testing.
//! Routes payloads between one server and any number of clients without
//! network I/O, optionally dropping unreliable traffic.

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet, VecDeque},
    rc::Rc,
    time::Duration,
};

use log::trace;

use snapsync_shared::{
    ConnectionId, DeliveryClass, EventKind, Transport, TransportError, TransportEvent,
};

/// Connection id under which every client sees the server
pub const SERVER_CONNECTION: ConnectionId = 0;

/// Network conditions applied to unreliable payloads. Reliable payloads are
/// always delivered, in order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinkConditionerConfig {
    /// Probability in `0.0..=1.0` that an unreliable payload is dropped
    pub loss: f32,
}

impl LinkConditionerConfig {
    pub fn new(loss: f32) -> Self {
        Self { loss }
    }

    pub fn perfect() -> Self {
        Self { loss: 0.0 }
    }

    pub fn lossy() -> Self {
        Self { loss: 0.3 }
    }
}

struct Hub {
    server_started: bool,
    server_events: VecDeque<TransportEvent>,
    client_events: HashMap<ConnectionId, VecDeque<TransportEvent>>,
    open: HashSet<ConnectionId>,
    blocked: HashSet<ConnectionId>,
    conditioner: LinkConditionerConfig,
    rng: fastrand::Rng,
    next_connection: ConnectionId,
    dropped: u64,
}

impl Hub {
    // Whether an unreliable payload on `connection` should be lost
    fn should_drop(&mut self, connection: ConnectionId, delivery: DeliveryClass) -> bool {
        if delivery.is_reliable() {
            return false;
        }
        let lost = self.blocked.contains(&connection)
            || (self.conditioner.loss > 0.0 && self.rng.f32() < self.conditioner.loss);
        if lost {
            self.dropped += 1;
        }
        lost
    }

    fn close(&mut self, connection: ConnectionId) -> bool {
        self.open.remove(&connection)
    }

    fn push_to_client(&mut self, connection: ConnectionId, event: TransportEvent) {
        self.client_events
            .entry(connection)
            .or_default()
            .push_back(event);
    }
}

/// Shared switchboard every `LocalTransport` of one test is plugged into
#[derive(Clone)]
pub struct LocalHub {
    inner: Rc<RefCell<Hub>>,
}

impl LocalHub {
    pub fn new(conditioner: LinkConditionerConfig, seed: u64) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Hub {
                server_started: false,
                server_events: VecDeque::new(),
                client_events: HashMap::new(),
                open: HashSet::new(),
                blocked: HashSet::new(),
                conditioner,
                rng: fastrand::Rng::with_seed(seed),
                next_connection: 1,
                dropped: 0,
            })),
        }
    }

    pub fn perfect() -> Self {
        Self::new(LinkConditionerConfig::perfect(), 0)
    }

    pub fn server_transport(&self) -> Box<dyn Transport> {
        Box::new(LocalTransport {
            hub: self.clone(),
            side: Side::Server,
        })
    }

    /// A client transport and the connection id the server will see it under
    pub fn client_transport(&self) -> (Box<dyn Transport>, ConnectionId) {
        let connection = {
            let mut hub = self.inner.borrow_mut();
            let connection = hub.next_connection;
            hub.next_connection += 1;
            connection
        };
        let transport = Box::new(LocalTransport {
            hub: self.clone(),
            side: Side::Client(connection),
        });
        (transport, connection)
    }

    pub fn set_conditioner(&self, conditioner: LinkConditionerConfig) {
        self.inner.borrow_mut().conditioner = conditioner;
    }

    /// Drops every unreliable payload on `connection`, both ways, while set
    pub fn set_blocked(&self, connection: ConnectionId, blocked: bool) {
        let mut hub = self.inner.borrow_mut();
        if blocked {
            hub.blocked.insert(connection);
        } else {
            hub.blocked.remove(&connection);
        }
    }

    /// Breaks a link: the server sees a transport failure, the client a
    /// disconnect
    pub fn fail_connection(&self, connection: ConnectionId) {
        let mut hub = self.inner.borrow_mut();
        if !hub.close(connection) {
            return;
        }
        hub.server_events
            .push_back(TransportEvent::new(EventKind::TransportFailure, connection));
        hub.push_to_client(
            connection,
            TransportEvent::new(EventKind::Disconnect, SERVER_CONNECTION),
        );
    }

    pub fn is_open(&self, connection: ConnectionId) -> bool {
        self.inner.borrow().open.contains(&connection)
    }

    /// Unreliable payloads lost so far
    pub fn dropped(&self) -> u64 {
        self.inner.borrow().dropped
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Server,
    Client(ConnectionId),
}

/// One end of a `LocalHub`
pub struct LocalTransport {
    hub: LocalHub,
    side: Side,
}

impl Transport for LocalTransport {
    fn start_server(&mut self) -> Result<(), TransportError> {
        let mut hub = self.hub.inner.borrow_mut();
        if self.side != Side::Server {
            return Err(TransportError::StartFailed {
                role: "server",
                reason: "this is a client transport".to_string(),
            });
        }
        if hub.server_started {
            return Err(TransportError::StartFailed {
                role: "server",
                reason: "a server is already listening on this hub".to_string(),
            });
        }
        hub.server_started = true;
        Ok(())
    }

    fn start_client(&mut self) -> Result<(), TransportError> {
        let Side::Client(connection) = self.side else {
            return Err(TransportError::StartFailed {
                role: "client",
                reason: "this is a server transport".to_string(),
            });
        };
        let mut hub = self.hub.inner.borrow_mut();
        if !hub.server_started {
            return Err(TransportError::StartFailed {
                role: "client",
                reason: "no server is listening".to_string(),
            });
        }
        hub.open.insert(connection);
        hub.server_events
            .push_back(TransportEvent::new(EventKind::Connect, connection));
        hub.push_to_client(
            connection,
            TransportEvent::new(EventKind::Connect, SERVER_CONNECTION),
        );
        Ok(())
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        let mut hub = self.hub.inner.borrow_mut();
        match self.side {
            Side::Server => hub.server_events.pop_front(),
            Side::Client(connection) => hub
                .client_events
                .get_mut(&connection)
                .and_then(VecDeque::pop_front),
        }
    }

    fn send(
        &mut self,
        connection: ConnectionId,
        payload: &[u8],
        delivery: DeliveryClass,
    ) -> Result<(), TransportError> {
        let mut hub = self.hub.inner.borrow_mut();
        let link = match self.side {
            Side::Server => connection,
            Side::Client(own) => own,
        };
        if !hub.open.contains(&link) {
            return Err(TransportError::UnknownConnection { connection });
        }
        if hub.should_drop(link, delivery) {
            trace!("dropping {} bytes on connection {}", payload.len(), link);
            return Ok(());
        }

        match self.side {
            Side::Server => {
                let event = TransportEvent::data(SERVER_CONNECTION, payload.to_vec(), Duration::ZERO);
                hub.push_to_client(link, event);
            }
            Side::Client(own) => {
                let event = TransportEvent::data(own, payload.to_vec(), Duration::ZERO);
                hub.server_events.push_back(event);
            }
        }
        Ok(())
    }

    fn disconnect_remote(&mut self, connection: ConnectionId) {
        let mut hub = self.hub.inner.borrow_mut();
        if hub.close(connection) {
            hub.push_to_client(
                connection,
                TransportEvent::new(EventKind::Disconnect, SERVER_CONNECTION),
            );
        }
    }

    fn disconnect_local(&mut self) {
        let Side::Client(connection) = self.side else {
            return;
        };
        let mut hub = self.hub.inner.borrow_mut();
        if hub.close(connection) {
            hub.server_events
                .push_back(TransportEvent::new(EventKind::Disconnect, connection));
        }
    }

    fn shutdown(&mut self) {
        match self.side {
            Side::Server => {
                let mut hub = self.hub.inner.borrow_mut();
                hub.server_started = false;
                hub.server_events.clear();
                let mut open: Vec<ConnectionId> = hub.open.drain().collect();
                open.sort_unstable();
                for connection in open {
                    hub.push_to_client(
                        connection,
                        TransportEvent::new(EventKind::Disconnect, SERVER_CONNECTION),
                    );
                }
            }
            Side::Client(connection) => {
                self.disconnect_local();
                self.hub
                    .inner
                    .borrow_mut()
                    .client_events
                    .remove(&connection);
            }
        }
    }

    fn server_connection_id(&self) -> ConnectionId {
        SERVER_CONNECTION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_of(event: Option<TransportEvent>) -> Vec<u8> {
        let event = event.expect("an event is queued");
        assert_eq!(event.kind, EventKind::Data);
        event.payload
    }

    #[test]
    fn clients_need_a_listening_server() {
        let hub = LocalHub::perfect();
        let (mut client, _) = hub.client_transport();
        assert!(matches!(
            client.start_client(),
            Err(TransportError::StartFailed { role: "client", .. })
        ));
    }

    #[test]
    fn payloads_reach_the_other_side() {
        let hub = LocalHub::perfect();
        let mut server = hub.server_transport();
        server.start_server().unwrap();
        let (mut client, connection) = hub.client_transport();
        client.start_client().unwrap();

        let connect = server.poll_event().unwrap();
        assert_eq!((connect.kind, connect.connection), (EventKind::Connect, connection));
        assert_eq!(client.poll_event().unwrap().kind, EventKind::Connect);

        client.send(SERVER_CONNECTION, &[1, 2], DeliveryClass::Reliable).unwrap();
        server.send(connection, &[3], DeliveryClass::Unreliable).unwrap();
        assert_eq!(data_of(server.poll_event()), vec![1, 2]);
        assert_eq!(data_of(client.poll_event()), vec![3]);
        assert!(server.poll_event().is_none());
    }

    #[test]
    fn blocked_links_only_lose_unreliable_payloads() {
        let hub = LocalHub::perfect();
        let mut server = hub.server_transport();
        server.start_server().unwrap();
        let (mut client, connection) = hub.client_transport();
        client.start_client().unwrap();
        client.poll_event();

        hub.set_blocked(connection, true);
        server.send(connection, &[1], DeliveryClass::Unreliable).unwrap();
        server.send(connection, &[2], DeliveryClass::ReliableSequenced).unwrap();
        assert_eq!(data_of(client.poll_event()), vec![2]);
        assert!(client.poll_event().is_none());
        assert_eq!(hub.dropped(), 1);
    }

    #[test]
    fn disconnects_are_seen_by_the_peer() {
        let hub = LocalHub::perfect();
        let mut server = hub.server_transport();
        server.start_server().unwrap();
        let (mut client, connection) = hub.client_transport();
        client.start_client().unwrap();
        server.poll_event();
        client.poll_event();

        client.disconnect_local();
        let event = server.poll_event().unwrap();
        assert_eq!((event.kind, event.connection), (EventKind::Disconnect, connection));
        assert_eq!(
            server.send(connection, &[1], DeliveryClass::Reliable),
            Err(TransportError::UnknownConnection { connection })
        );
    }
}
