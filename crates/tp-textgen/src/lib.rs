#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex, OnceLock};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerateError {
    #[error("prompt is empty")]
    EmptyPrompt,
    #[error("text generation backend failed: {0}")]
    Backend(String),
}

/// Opaque text-generation collaborator.
///
/// The pipeline treats generation as a request/response service: a prompt
/// and a length budget go in, generated text comes out. Model internals
/// live entirely behind this seam.
pub trait TextGenerator: Send + Sync {
    /// Continue `prompt`, returning at most `max_len` characters of text
    /// (prompt included).
    fn generate(&self, prompt: &str, max_len: usize) -> Result<String, GenerateError>;
}

/// Deterministic generator backed by a fixed continuation. Stands in for
/// a real model in tests and demos.
#[derive(Debug, Clone)]
pub struct CannedGenerator {
    continuation: String,
}

impl CannedGenerator {
    #[must_use]
    pub fn new(continuation: impl Into<String>) -> Self {
        Self {
            continuation: continuation.into(),
        }
    }
}

impl TextGenerator for CannedGenerator {
    fn generate(&self, prompt: &str, max_len: usize) -> Result<String, GenerateError> {
        if prompt.trim().is_empty() {
            return Err(GenerateError::EmptyPrompt);
        }

        let mut out = format!("{prompt} {}", self.continuation);
        if let Some((boundary, _)) = out.char_indices().nth(max_len) {
            out.truncate(boundary);
        }
        Ok(out)
    }
}

#[derive(Debug, Error)]
pub enum GeneratorCacheError {
    #[error("generator cache lock was poisoned by a panicking caller")]
    Poisoned,
    #[error(transparent)]
    Generate(#[from] GenerateError),
}

/// Lifecycle-scoped memoization of an expensive generator load, the same
/// pattern as the dataset cache: load once, reuse for the process
/// lifetime, `reset` as the teardown hook for tests.
#[derive(Default)]
pub struct GeneratorCache {
    slot: Mutex<Option<Arc<dyn TextGenerator>>>,
}

impl GeneratorCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide cache instance, explicitly initialized on first use.
    #[must_use]
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<GeneratorCache> = OnceLock::new();
        GLOBAL.get_or_init(Self::new)
    }

    /// Return the cached generator, invoking `loader` only on the first
    /// call (or the first call after `reset`).
    pub fn get_or_init<F>(&self, loader: F) -> Result<Arc<dyn TextGenerator>, GeneratorCacheError>
    where
        F: FnOnce() -> Result<Arc<dyn TextGenerator>, GenerateError>,
    {
        let mut slot = self.slot.lock().map_err(|_| GeneratorCacheError::Poisoned)?;
        if let Some(generator) = slot.as_ref() {
            return Ok(Arc::clone(generator));
        }

        let generator = loader()?;
        *slot = Some(Arc::clone(&generator));
        Ok(generator)
    }

    /// Drop the cached generator so the next `get_or_init` loads again.
    pub fn reset(&self) -> Result<(), GeneratorCacheError> {
        *self.slot.lock().map_err(|_| GeneratorCacheError::Poisoned)? = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{CannedGenerator, GenerateError, GeneratorCache, TextGenerator};

    #[test]
    fn canned_generator_appends_and_respects_length_budget() {
        let generator = CannedGenerator::new("crossed the road to filter the other side.");

        let out = generator
            .generate("Why did the chicken", 100)
            .expect("generate");
        assert_eq!(
            out,
            "Why did the chicken crossed the road to filter the other side."
        );

        let short = generator.generate("Why did the chicken", 10).expect("short");
        assert_eq!(short, "Why did th");
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let generator = CannedGenerator::new("später");
        let out = generator.generate("bis", 7).expect("generate");
        assert_eq!(out, "bis spä");
    }

    #[test]
    fn empty_prompt_is_rejected() {
        let generator = CannedGenerator::new("anything");
        let err = generator.generate("   ", 100).expect_err("must fail");
        assert_eq!(err, GenerateError::EmptyPrompt);
    }

    #[test]
    fn cache_loads_once_and_shares_the_instance() {
        let cache = GeneratorCache::new();
        let loads = AtomicUsize::new(0);

        let mut load = || {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(CannedGenerator::new("ha")) as Arc<dyn TextGenerator>)
        };

        let first = cache.get_or_init(&mut load).expect("first");
        let second = cache.get_or_init(&mut load).expect("second");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_forces_a_fresh_load() {
        let cache = GeneratorCache::new();
        let loads = AtomicUsize::new(0);
        let mut load = || {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(CannedGenerator::new("ha")) as Arc<dyn TextGenerator>)
        };

        let first = cache.get_or_init(&mut load).expect("first");
        cache.reset().expect("reset");
        let second = cache.get_or_init(&mut load).expect("second");

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn loader_failures_are_not_cached() {
        let cache = GeneratorCache::new();

        let err = match cache
            .get_or_init(|| Err(GenerateError::Backend("model file missing".to_owned())))
        {
            Err(err) => err,
            Ok(_) => panic!("must fail"),
        };
        assert_eq!(
            err.to_string(),
            "text generation backend failed: model file missing"
        );

        let recovered = cache
            .get_or_init(|| Ok(Arc::new(CannedGenerator::new("ha")) as Arc<dyn TextGenerator>))
            .expect("recovered");
        assert_eq!(recovered.generate("hi", 5).expect("generate"), "hi ha");
    }
}
