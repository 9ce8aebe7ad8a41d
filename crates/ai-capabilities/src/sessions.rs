use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{CapabilityError, Result};
use crate::family::CapabilityFamily;
use crate::host::{CreateOptions, HostSession};
use crate::resolver::Binding;

struct CachedSession {
    session: HostSession,
    options: CreateOptions,
}

/// Holds at most one live session per family.
///
/// The lock is never held across `create`; two racing creates both succeed and
/// the one cached last wins.
#[derive(Default)]
pub struct SessionCache {
    slots: Mutex<HashMap<CapabilityFamily, CachedSession>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached session when it was created with the same options,
    /// otherwise creates and caches a new one.
    pub async fn get_or_create(
        &self,
        binding: &Binding,
        options: &CreateOptions,
        force_new: bool,
    ) -> Result<HostSession> {
        let family = binding.family();
        if !force_new {
            if let Some(cached) = self.slots.lock().await.get(&family) {
                if cached.options == *options {
                    return Ok(cached.session.clone());
                }
            }
        }

        debug!(
            target: "ai_capabilities::sessions",
            family = family.as_str(),
            force_new,
            "creating session"
        );
        let session = match binding.handle().create(options).await {
            Ok(session) => session,
            Err(err) => {
                self.invalidate(family).await;
                return Err(err.into());
            }
        };
        if session.family() != family {
            self.invalidate(family).await;
            return Err(CapabilityError::SessionMismatch {
                expected: family,
                actual: session.family(),
            });
        }

        self.slots.lock().await.insert(
            family,
            CachedSession {
                session: session.clone(),
                options: options.clone(),
            },
        );
        Ok(session)
    }

    pub async fn invalidate(&self, family: CapabilityFamily) {
        self.slots.lock().await.remove(&family);
    }

    pub async fn contains(&self, family: CapabilityFamily) -> bool {
        self.slots.lock().await.contains_key(&family)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HostError;
    use crate::host::{HostBinding, HostEnvironment, SummarizerSession};
    use crate::resolver::{BindingResolver, StrategyTable};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct EchoSummarizer;

    #[async_trait]
    impl SummarizerSession for EchoSummarizer {
        async fn summarize(&self, text: &str) -> std::result::Result<Value, HostError> {
            Ok(json!(text))
        }
    }

    #[derive(Default)]
    struct Factory {
        creates: AtomicUsize,
        fail_first: bool,
        wrong_family: bool,
    }

    #[async_trait]
    impl HostBinding for Factory {
        fn provider(&self) -> &str {
            "factory"
        }

        async fn create(
            &self,
            _options: &CreateOptions,
        ) -> std::result::Result<HostSession, HostError> {
            let attempt = self.creates.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && attempt == 0 {
                return Err(HostError::new("model is still loading"));
            }
            if self.wrong_family {
                return Ok(HostSession::Translator(Arc::new(NoTranslate)));
            }
            Ok(HostSession::Summarizer(Arc::new(EchoSummarizer)))
        }
    }

    struct NoTranslate;

    #[async_trait]
    impl crate::host::TranslatorSession for NoTranslate {
        async fn translate(
            &self,
            _text: &str,
            _options: &crate::host::TranslateOptions,
        ) -> std::result::Result<Value, HostError> {
            Err(HostError::new("unused"))
        }
    }

    struct FactoryHost(Arc<Factory>);

    impl HostEnvironment for FactoryHost {
        fn lookup(&self, path: &str) -> Option<Arc<dyn HostBinding>> {
            (path == "ai.summarizer").then(|| self.0.clone() as Arc<dyn HostBinding>)
        }
    }

    fn binding(factory: Arc<Factory>) -> Binding {
        BindingResolver::new(Arc::new(FactoryHost(factory)), StrategyTable::default())
            .resolve(CapabilityFamily::Summarizer)
            .unwrap()
    }

    #[tokio::test]
    async fn reuses_session_until_forced() {
        let factory = Arc::new(Factory::default());
        let binding = binding(factory.clone());
        let cache = SessionCache::new();
        let options = CreateOptions::default();

        let first = cache.get_or_create(&binding, &options, false).await.unwrap();
        let second = cache.get_or_create(&binding, &options, false).await.unwrap();
        assert!(first.same_instance(&second));
        assert_eq!(factory.creates.load(Ordering::SeqCst), 1);

        let forced = cache.get_or_create(&binding, &options, true).await.unwrap();
        assert!(!forced.same_instance(&first));
        assert_eq!(factory.creates.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn changed_options_replace_session() {
        let factory = Arc::new(Factory::default());
        let binding = binding(factory.clone());
        let cache = SessionCache::new();

        let english = CreateOptions {
            target_language: Some("en".into()),
            ..CreateOptions::default()
        };
        let french = CreateOptions {
            target_language: Some("fr".into()),
            ..CreateOptions::default()
        };
        cache.get_or_create(&binding, &english, false).await.unwrap();
        cache.get_or_create(&binding, &french, false).await.unwrap();
        cache.get_or_create(&binding, &french, false).await.unwrap();
        assert_eq!(factory.creates.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_create_leaves_slot_empty() {
        let factory = Arc::new(Factory {
            fail_first: true,
            ..Factory::default()
        });
        let binding = binding(factory.clone());
        let cache = SessionCache::new();

        assert!(cache
            .get_or_create(&binding, &CreateOptions::default(), false)
            .await
            .is_err());
        assert!(!cache.contains(CapabilityFamily::Summarizer).await);

        cache
            .get_or_create(&binding, &CreateOptions::default(), false)
            .await
            .unwrap();
        assert!(cache.contains(CapabilityFamily::Summarizer).await);
        assert_eq!(factory.creates.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rejects_session_of_wrong_family() {
        let factory = Arc::new(Factory {
            wrong_family: true,
            ..Factory::default()
        });
        let cache = SessionCache::new();
        let err = cache
            .get_or_create(&binding(factory), &CreateOptions::default(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::SessionMismatch { .. }));
    }
}
