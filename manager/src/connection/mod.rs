mod connection_registry;
mod pending_client;

pub use connection_registry::ConnectionRegistry;
pub use pending_client::{ConnectionState, PendingClient};
