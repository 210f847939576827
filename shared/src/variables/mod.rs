mod config;
mod error;
mod network_variable;
mod replicate;
mod replicator;

pub use config::VariableConfig;
pub use error::VariableError;
pub use network_variable::{
    NetworkVariable, ReadPermission, Variable, VariableSettings, WritePermission,
};
pub use replicate::Replicate;
pub use replicator::{DeltaScope, ReadScope, VariableDeltaHeader, VariableReplicator};
