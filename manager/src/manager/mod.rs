mod handlers;
mod lifecycle;
mod manager_state;
mod network_manager;

pub use lifecycle::LifecycleState;
pub use network_manager::NetworkManager;
