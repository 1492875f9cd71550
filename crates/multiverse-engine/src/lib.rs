pub mod branch;
pub mod config;
pub mod stream;

pub use branch::{BranchManager, Generation};
pub use config::EngineConfig;
pub use stream::aggregator::{
    failure_content, GenerationOutcome, GenerationTarget, StreamAggregator,
};

#[cfg(test)]
pub(crate) mod test_support;
