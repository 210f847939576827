/// Contains Config properties which will be used by the variable replicator
#[derive(Clone, Debug)]
pub struct VariableConfig {
    /// Prefix every field with its byte length, so that a reader can skip a
    /// field it cannot or may not read
    pub ensure_length_safety: bool,
}

impl Default for VariableConfig {
    fn default() -> Self {
        Self {
            ensure_length_safety: true,
        }
    }
}
