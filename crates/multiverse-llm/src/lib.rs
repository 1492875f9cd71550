pub mod provider;
pub mod providers;

pub use provider::{FragmentStream, InferenceError, InferenceProvider, ModelInfo, Result};
pub use providers::ollama::{OllamaProvider, DEFAULT_OLLAMA_URL};
