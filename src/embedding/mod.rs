/// Text embedding
///
/// - EmbeddingProvider trait for abstraction over backends
/// - FastEmbedProvider for local ONNX models (all-MiniLM-L6-v2, 384-dim)
/// - LazyProvider to build the model once, on first use, and share it
mod lazy;
mod provider;

pub use lazy::LazyProvider;
pub use provider::{model_dimension, EmbeddingError, EmbeddingProvider, FastEmbedProvider};
