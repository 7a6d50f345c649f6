use fxhash::hash64;

use super::{Embedder, EmbedderError};

/// Deterministic embedder deriving sinusoid values from a hash of the text.
///
/// Identical text always yields an identical vector, which makes it suitable
/// for reproducible tests and for running the service without a model.
#[derive(Debug, Clone)]
pub struct StubEmbedder {
    dimension: usize,
    model_name: String,
}

impl StubEmbedder {
    pub fn new(dimension: usize, model_name: impl Into<String>) -> Self {
        Self {
            dimension,
            model_name: model_name.into(),
        }
    }
}

impl Embedder for StubEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let h = hash64(text.as_bytes());
        let v = (0..self.dimension)
            .map(|idx| ((h >> (idx % 32)) as f32 * 0.0001).sin())
            .collect();
        Ok(v)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_has_requested_dimension() {
        let embedder = StubEmbedder::new(384, "stub");
        assert_eq!(embedder.embed("pasta").unwrap().len(), 384);
    }

    #[test]
    fn stub_is_deterministic() {
        let embedder = StubEmbedder::new(16, "stub");
        assert_eq!(
            embedder.embed("same text").unwrap(),
            embedder.embed("same text").unwrap()
        );
    }

    #[test]
    fn stub_differs_by_text() {
        let embedder = StubEmbedder::new(16, "stub");
        assert_ne!(
            embedder.embed("chocolate cake").unwrap(),
            embedder.embed("beef stew").unwrap()
        );
    }
}
