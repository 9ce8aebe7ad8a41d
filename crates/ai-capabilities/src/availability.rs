use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::family::CapabilityFamily;
use crate::host::{HostAvailability, HostCapabilities};
use crate::resolver::{Binding, SurfaceShape};

/// Whether a family can be used and what has to happen first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityState {
    Unknown,
    No,
    AfterDownload,
    Readily,
    /// Factory surface without a probe; usable, availability unverified.
    FactoryOnly,
}

impl AvailabilityState {
    pub fn from_host(available: HostAvailability) -> Self {
        match available {
            HostAvailability::No => AvailabilityState::No,
            HostAvailability::AfterDownload => AvailabilityState::AfterDownload,
            HostAvailability::Readily => AvailabilityState::Readily,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedCapabilities {
    state: AvailabilityState,
    capabilities: Option<HostCapabilities>,
}

/// Per-family cache of the last observed availability.
#[derive(Debug, Default)]
pub struct CapabilityCache {
    entries: Mutex<HashMap<CapabilityFamily, CachedCapabilities>>,
}

impl CapabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached state, probing the binding once if nothing is cached.
    pub async fn availability(&self, binding: &Binding) -> Result<AvailabilityState> {
        let family = binding.family();
        if let Some(entry) = self.entries.lock().await.get(&family) {
            return Ok(entry.state);
        }

        let entry = if binding.has_capabilities_probe() {
            let capabilities = binding.handle().capabilities().await?;
            CachedCapabilities {
                state: AvailabilityState::from_host(capabilities.available),
                capabilities: Some(capabilities),
            }
        } else {
            // The create call fails on its own if this guess is wrong.
            let state = match binding.shape() {
                SurfaceShape::Property => AvailabilityState::Readily,
                SurfaceShape::Factory => AvailabilityState::FactoryOnly,
            };
            CachedCapabilities {
                state,
                capabilities: None,
            }
        };

        debug!(
            target: "ai_capabilities::availability",
            family = family.as_str(),
            state = ?entry.state,
            probed = entry.capabilities.is_some(),
            "cached availability"
        );
        let state = entry.state;
        self.entries.lock().await.insert(family, entry);
        Ok(state)
    }

    pub async fn cached(&self, family: CapabilityFamily) -> AvailabilityState {
        self.entries
            .lock()
            .await
            .get(&family)
            .map(|entry| entry.state)
            .unwrap_or(AvailabilityState::Unknown)
    }

    /// Probe result kept from the last `availability` call.
    pub async fn capabilities(&self, family: CapabilityFamily) -> Option<HostCapabilities> {
        self.entries
            .lock()
            .await
            .get(&family)
            .and_then(|entry| entry.capabilities.clone())
    }

    /// Records a completed download, discarding the stale probe result.
    pub async fn mark_readily(&self, family: CapabilityFamily) {
        self.entries.lock().await.insert(
            family,
            CachedCapabilities {
                state: AvailabilityState::Readily,
                capabilities: None,
            },
        );
    }

    pub async fn clear(&self, family: CapabilityFamily) {
        self.entries.lock().await.remove(&family);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HostError;
    use crate::host::{CreateOptions, HostBinding, HostEnvironment, HostSession};
    use crate::resolver::{BindingResolver, ProbeStrategy, StrategyTable};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct ProbedBinding {
        probe: Option<HostAvailability>,
        probes: AtomicUsize,
    }

    #[async_trait]
    impl HostBinding for ProbedBinding {
        fn provider(&self) -> &str {
            "probed"
        }

        fn has_capabilities_probe(&self) -> bool {
            self.probe.is_some()
        }

        async fn capabilities(&self) -> std::result::Result<HostCapabilities, HostError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            let available = self.probe.ok_or_else(|| HostError::new("no probe"))?;
            Ok(HostCapabilities::new(available))
        }

        async fn create(
            &self,
            _options: &CreateOptions,
        ) -> std::result::Result<HostSession, HostError> {
            Err(HostError::new("unused"))
        }
    }

    struct SingleSurface(Arc<ProbedBinding>);

    impl HostEnvironment for SingleSurface {
        fn lookup(&self, path: &str) -> Option<Arc<dyn HostBinding>> {
            (path == "ai.summarizer" || path == "Summarizer")
                .then(|| self.0.clone() as Arc<dyn HostBinding>)
        }
    }

    fn binding_for(binding: Arc<ProbedBinding>, table: StrategyTable) -> Binding {
        BindingResolver::new(Arc::new(SingleSurface(binding)), table)
            .resolve(CapabilityFamily::Summarizer)
            .unwrap()
    }

    #[tokio::test]
    async fn probes_once_and_caches() {
        let handle = Arc::new(ProbedBinding {
            probe: Some(HostAvailability::AfterDownload),
            probes: AtomicUsize::new(0),
        });
        let binding = binding_for(handle.clone(), StrategyTable::default());
        let cache = CapabilityCache::new();

        assert_eq!(
            cache.availability(&binding).await.unwrap(),
            AvailabilityState::AfterDownload
        );
        assert_eq!(
            cache.availability(&binding).await.unwrap(),
            AvailabilityState::AfterDownload
        );
        assert_eq!(handle.probes.load(Ordering::SeqCst), 1);

        cache.mark_readily(CapabilityFamily::Summarizer).await;
        assert_eq!(
            cache.availability(&binding).await.unwrap(),
            AvailabilityState::Readily
        );
        assert!(cache.capabilities(CapabilityFamily::Summarizer).await.is_none());
        assert_eq!(handle.probes.load(Ordering::SeqCst), 1);

        cache.clear(CapabilityFamily::Summarizer).await;
        assert_eq!(
            cache.cached(CapabilityFamily::Summarizer).await,
            AvailabilityState::Unknown
        );
    }

    #[tokio::test]
    async fn missing_probe_defaults_by_surface_shape() {
        let handle = Arc::new(ProbedBinding {
            probe: None,
            probes: AtomicUsize::new(0),
        });
        let property = binding_for(handle.clone(), StrategyTable::default());
        let cache = CapabilityCache::new();
        assert_eq!(
            cache.availability(&property).await.unwrap(),
            AvailabilityState::Readily
        );

        let factory_only = StrategyTable::empty().with(
            CapabilityFamily::Summarizer,
            ProbeStrategy::factory("global-summarizer", "Summarizer"),
        );
        let factory = binding_for(handle.clone(), factory_only);
        let cache = CapabilityCache::new();
        assert_eq!(
            cache.availability(&factory).await.unwrap(),
            AvailabilityState::FactoryOnly
        );
        assert_eq!(handle.probes.load(Ordering::SeqCst), 0);
    }
}
