/// Configuration for the branch manager.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Capacity of each generation's event channel.
    pub event_buffer: usize,
    /// Prepended to the inference context when the branch has no system node
    /// at its root. Never persisted.
    pub system_prompt: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_buffer: 100,
            system_prompt: None,
        }
    }
}
