/// Lazily-initialised shared embedding provider
use super::{model_dimension, EmbeddingError, EmbeddingProvider, FastEmbedProvider};
use std::sync::{Arc, Mutex, OnceLock};

type Factory = dyn Fn() -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> + Send + Sync;

/// Builds the wrapped provider on first use and reuses it afterwards
///
/// Loading an ONNX model takes seconds, so the process-wide provider is created
/// on the first embedding request rather than at startup. Concurrent first
/// calls block on `init_lock`; only one of them runs the factory. A failed
/// initialisation is not cached, the next call tries again.
pub struct LazyProvider {
    model_name: String,
    dimension: usize,
    factory: Box<Factory>,
    cell: OnceLock<Arc<dyn EmbeddingProvider>>,
    init_lock: Mutex<()>,
}

impl LazyProvider {
    /// Lazily load a fastembed model by name
    pub fn fastembed(model_name: &str) -> Result<Self, EmbeddingError> {
        let dimension = model_dimension(model_name)?;
        let name = model_name.to_string();
        Ok(Self::with_factory(model_name, dimension, move || {
            Ok(Arc::new(FastEmbedProvider::new(&name)?) as Arc<dyn EmbeddingProvider>)
        }))
    }

    /// Lazily build any provider
    pub fn with_factory<F>(model_name: &str, dimension: usize, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> + Send + Sync + 'static,
    {
        Self {
            model_name: model_name.to_string(),
            dimension,
            factory: Box::new(factory),
            cell: OnceLock::new(),
            init_lock: Mutex::new(()),
        }
    }

    /// Whether the underlying provider has been built yet
    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }

    fn get(&self) -> Result<&Arc<dyn EmbeddingProvider>, EmbeddingError> {
        if let Some(provider) = self.cell.get() {
            return Ok(provider);
        }

        let _guard = self
            .init_lock
            .lock()
            .map_err(|_| EmbeddingError::InitializationError("init lock poisoned".to_string()))?;

        if let Some(provider) = self.cell.get() {
            return Ok(provider);
        }

        let provider = (self.factory)()?;
        if provider.dimension() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: provider.dimension(),
            });
        }

        Ok(self.cell.get_or_init(|| provider))
    }
}

impl EmbeddingProvider for LazyProvider {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.get()?.embed_batch(texts)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ConstProvider;

    impl EmbeddingProvider for ConstProvider {
        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "const"
        }
    }

    #[test]
    fn test_factory_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let lazy = LazyProvider::with_factory("const", 2, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(ConstProvider) as Arc<dyn EmbeddingProvider>)
        });

        assert!(!lazy.is_initialized());
        lazy.embed("a").unwrap();
        lazy.embed_batch(&["bb".to_string(), "c".to_string()]).unwrap();
        assert!(lazy.is_initialized());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_batch_does_not_initialize() {
        let lazy = LazyProvider::with_factory("const", 2, || {
            Ok(Arc::new(ConstProvider) as Arc<dyn EmbeddingProvider>)
        });
        assert!(lazy.embed_batch(&[]).unwrap().is_empty());
        assert!(!lazy.is_initialized());
    }

    #[test]
    fn test_failed_init_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let lazy = LazyProvider::with_factory("const", 2, move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(EmbeddingError::InitializationError("offline".to_string()))
            } else {
                Ok(Arc::new(ConstProvider) as Arc<dyn EmbeddingProvider>)
            }
        });

        assert!(lazy.embed("x").is_err());
        assert!(lazy.embed("x").is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let lazy = LazyProvider::with_factory("const", 384, || {
            Ok(Arc::new(ConstProvider) as Arc<dyn EmbeddingProvider>)
        });
        assert!(matches!(
            lazy.embed("x"),
            Err(EmbeddingError::DimensionMismatch { .. })
        ));
    }
}
