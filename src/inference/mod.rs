// Inference capabilities: vision analysis, text embedding, text generation

pub mod ollama;
pub mod parse;

use std::sync::Mutex;
use serde::{Deserialize, Serialize};
use crate::db::models::SceneAnalysis;
use crate::error::{BrollError, Result};

pub use ollama::OllamaClient;

/// Describes a clip from its keyframes (JPEG bytes)
pub trait VisionAnalyzer: Send + Sync {
    fn analyze(&self, keyframes: &[Vec<u8>]) -> Result<SceneAnalysis>;
}

/// Turns text into a fixed-dimension vector
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Produces a reply to a conversation
pub trait Generator: Send + Sync {
    fn generate(&self, messages: &[ChatMessage]) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Check a model-produced embedding before anything stores or searches with it.
pub fn validate_embedding(embedding: Vec<f32>, dimensions: usize, stage: &str) -> Result<Vec<f32>> {
    if embedding.is_empty() {
        return Err(BrollError::model(stage, "model returned an empty embedding"));
    }
    if embedding.len() != dimensions {
        return Err(BrollError::model(
            stage,
            format!("embedding has {} dimensions, expected {}", embedding.len(), dimensions),
        ));
    }
    if embedding.iter().any(|v| !v.is_finite()) || embedding.iter().all(|v| *v == 0.0) {
        return Err(BrollError::model(stage, "embedding is zero or contains non-finite values"));
    }
    Ok(embedding)
}

/// Serializes every call to the wrapped backend (at most one request in
/// flight) and retries calls that time out.
pub struct InferenceGate<B> {
    backend: B,
    in_flight: Mutex<()>,
    retries: u32,
}

impl<B> InferenceGate<B> {
    pub fn new(backend: B, retries: u32) -> Self {
        Self {
            backend,
            in_flight: Mutex::new(()),
            retries,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn call<T>(&self, stage: &str, f: impl Fn(&B) -> Result<T>) -> Result<T> {
        // A poisoned lock only means another call panicked; the unit guard is still usable
        let _guard = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());

        let mut attempt = 0;
        loop {
            match f(&self.backend) {
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    log::warn!("{} call failed ({}), retry {}/{}", stage, e, attempt, self.retries);
                }
                result => return result,
            }
        }
    }
}

impl<B: VisionAnalyzer> VisionAnalyzer for InferenceGate<B> {
    fn analyze(&self, keyframes: &[Vec<u8>]) -> Result<SceneAnalysis> {
        self.call("vision", |b| b.analyze(keyframes))
    }
}

impl<B: Embedder> Embedder for InferenceGate<B> {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.call("embed", |b| b.embed(text))
    }
}

impl<B: Generator> Generator for InferenceGate<B> {
    fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        self.call("chat", |b| b.generate(messages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct Flaky {
        calls: AtomicU32,
        fail_first: u32,
        error: fn() -> BrollError,
    }

    impl Embedder for Flaky {
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err((self.error)())
            } else {
                Ok(vec![1.0])
            }
        }
    }

    fn timeout() -> BrollError {
        BrollError::ModelTimeout { stage: "embed".into() }
    }

    fn refused() -> BrollError {
        BrollError::model("embed", "model not found")
    }

    #[test]
    fn test_gate_retries_timeouts() {
        let gate = InferenceGate::new(Flaky { calls: AtomicU32::new(0), fail_first: 1, error: timeout }, 1);
        assert_eq!(gate.embed("x").unwrap(), vec![1.0]);
        assert_eq!(gate.backend().calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_gate_gives_up_after_retries() {
        let gate = InferenceGate::new(Flaky { calls: AtomicU32::new(0), fail_first: 5, error: timeout }, 2);
        assert!(matches!(gate.embed("x"), Err(BrollError::ModelTimeout { .. })));
        assert_eq!(gate.backend().calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_gate_does_not_retry_explicit_errors() {
        let gate = InferenceGate::new(Flaky { calls: AtomicU32::new(0), fail_first: 5, error: refused }, 3);
        assert!(matches!(gate.embed("x"), Err(BrollError::Model { .. })));
        assert_eq!(gate.backend().calls.load(Ordering::SeqCst), 1);
    }

    struct Slow {
        active: AtomicU32,
        max_seen: AtomicU32,
    }

    impl Embedder for Slow {
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(10));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![1.0])
        }
    }

    #[test]
    fn test_gate_caps_concurrency_at_one() {
        let gate = Arc::new(InferenceGate::new(
            Slow { active: AtomicU32::new(0), max_seen: AtomicU32::new(0) },
            0,
        ));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gate = Arc::clone(&gate);
                std::thread::spawn(move || gate.embed("x").unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(gate.backend().max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_validate_embedding() {
        assert!(validate_embedding(vec![0.1, 0.2], 2, "embed").is_ok());
        assert!(validate_embedding(vec![], 2, "embed").is_err());
        assert!(validate_embedding(vec![0.1], 2, "embed").is_err());
        assert!(validate_embedding(vec![0.0, 0.0], 2, "embed").is_err());
        assert!(validate_embedding(vec![f32::NAN, 1.0], 2, "embed").is_err());
    }
}
