pub mod backends;
pub mod cache;

pub use backends::{BaiduBackend, BingBackend, GoogleBackend, HfBackend, TranslationBackend};
pub use cache::TranslationCache;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, instrument};

use crate::core::config::TranslationConfig;
use crate::core::types::TranslationMethod;
use crate::middleware::CircuitBreaker;
use crate::utils::Metrics;

/// Turns recognized source text into target-language text
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, method: TranslationMethod) -> Result<String>;
}

struct GuardedBackend {
    backend: Box<dyn TranslationBackend>,
    breaker: CircuitBreaker,
}

/// Routes each call to the backend selected by `TranslationMethod`.
///
/// Every backend sits behind its own circuit breaker; successful results are cached.
pub struct BackendTranslator {
    backends: HashMap<TranslationMethod, GuardedBackend>,
    cache: TranslationCache,
    metrics: Option<Metrics>,
}

impl BackendTranslator {
    /// Production routing table: one HTTP backend per method, sharing one client
    pub fn from_config(config: &TranslationConfig, metrics: Option<Metrics>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(std::time::Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .build()
            .context("Failed to create HTTP client")?;

        let backends: Vec<(TranslationMethod, Box<dyn TranslationBackend>)> = TranslationMethod::ALL
            .into_iter()
            .map(|method| {
                let backend: Box<dyn TranslationBackend> = match method {
                    TranslationMethod::Google => Box::new(GoogleBackend::new(client.clone(), config)),
                    TranslationMethod::Hf => Box::new(HfBackend::new(client.clone(), config)),
                    TranslationMethod::Baidu => Box::new(BaiduBackend::new(client.clone(), config)),
                    TranslationMethod::Bing => Box::new(BingBackend::new(client.clone(), config)),
                };
                (method, backend)
            })
            .collect();

        Ok(Self::with_backends(backends, config.cache_entries, metrics))
    }

    pub fn with_backends(
        backends: Vec<(TranslationMethod, Box<dyn TranslationBackend>)>,
        cache_entries: usize,
        metrics: Option<Metrics>,
    ) -> Self {
        let backends = backends
            .into_iter()
            .map(|(method, backend)| {
                let breaker = CircuitBreaker::new(backend.name());
                (method, GuardedBackend { backend, breaker })
            })
            .collect();

        Self {
            backends,
            cache: TranslationCache::new(cache_entries, metrics.clone()),
            metrics,
        }
    }
}

#[async_trait]
impl Translator for BackendTranslator {
    #[instrument(skip(self, text), fields(method = %method, chars = text.chars().count()))]
    async fn translate(&self, text: &str, method: TranslationMethod) -> Result<String> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(String::new());
        }

        if let Some(cached) = self.cache.get(method, text) {
            debug!("Translation cache hit");
            return Ok(cached);
        }

        let guarded = self
            .backends
            .get(&method)
            .with_context(|| format!("No backend registered for {}", method))?;

        let translated = guarded
            .breaker
            .call(guarded.backend.translate(text))
            .await?;

        if let Some(ref m) = self.metrics {
            m.record_translation(method.as_str());
        }
        self.cache.put(method, text, &translated);
        debug!("Translated to {} chars", translated.chars().count());
        Ok(translated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::{TranslationError, TranslationResult};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingBackend {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl TranslationBackend for CountingBackend {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn translate(&self, text: &str) -> TranslationResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(TranslationError::InvalidResponse {
                    backend: "counting",
                    reason: "down".to_string(),
                });
            }
            Ok(format!("[{}]", text))
        }
    }

    fn translator(fail: bool) -> (BackendTranslator, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let backend: Box<dyn TranslationBackend> = Box::new(CountingBackend {
            calls: Arc::clone(&calls),
            fail,
        });
        let translator = BackendTranslator::with_backends(
            vec![(TranslationMethod::Google, backend)],
            16,
            None,
        );
        (translator, calls)
    }

    #[tokio::test]
    async fn test_empty_text_skips_backend() {
        let (translator, calls) = translator(false);
        assert_eq!(translator.translate("  \n", TranslationMethod::Google).await.unwrap(), "");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_results_are_cached() {
        let (translator, calls) = translator(false);
        for _ in 0..3 {
            let out = translator.translate("猫", TranslationMethod::Google).await.unwrap();
            assert_eq!(out, "[猫]");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unregistered_method_errors() {
        let (translator, _) = translator(false);
        assert!(translator.translate("猫", TranslationMethod::Bing).await.is_err());
    }

    #[tokio::test]
    async fn test_breaker_opens_after_repeated_failures() {
        let (translator, calls) = translator(true);
        for _ in 0..5 {
            assert!(translator.translate("猫", TranslationMethod::Google).await.is_err());
        }
        let err = translator
            .translate("猫", TranslationMethod::Google)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("circuit breaker open"));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_production_table_covers_every_method() {
        let config = crate::core::config::Config::default();
        let translator = BackendTranslator::from_config(&config.translation, None).unwrap();
        for method in TranslationMethod::ALL {
            assert!(translator.backends.contains_key(&method));
        }
    }
}
