/// Start/stop state of a NetworkManager
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LifecycleState {
    #[default]
    Idle,
    /// Running as server, client or host
    Listening,
    /// Shutdown was requested, the next `late_update` tears everything down
    ShuttingDown,
}
