use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::family::CapabilityFamily;
use crate::host::{HostBinding, HostEnvironment};

/// How a surface is exposed by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceShape {
    /// A sub-object of a namespace, usually with a `capabilities()` probe.
    Property,
    /// A bare global factory without an availability probe.
    Factory,
}

/// One named place to look for a family's surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeStrategy {
    pub name: String,
    pub path: String,
    pub shape: SurfaceShape,
}

impl ProbeStrategy {
    pub fn property(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            shape: SurfaceShape::Property,
        }
    }

    pub fn factory(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            shape: SurfaceShape::Factory,
        }
    }
}

/// Ordered probe strategies per family. Earlier entries win.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyTable {
    entries: IndexMap<CapabilityFamily, Vec<ProbeStrategy>>,
}

impl StrategyTable {
    pub fn empty() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Appends a strategy after the existing ones for `family`.
    pub fn push(&mut self, family: CapabilityFamily, strategy: ProbeStrategy) {
        self.entries.entry(family).or_default().push(strategy);
    }

    pub fn with(mut self, family: CapabilityFamily, strategy: ProbeStrategy) -> Self {
        self.push(family, strategy);
        self
    }

    pub fn strategies(&self, family: CapabilityFamily) -> &[ProbeStrategy] {
        self.entries
            .get(&family)
            .map(|strategies| strategies.as_slice())
            .unwrap_or(&[])
    }
}

impl Default for StrategyTable {
    fn default() -> Self {
        use CapabilityFamily::*;
        Self::empty()
            .with(Assistant, ProbeStrategy::property("ai-language-model", "ai.languageModel"))
            .with(Assistant, ProbeStrategy::property("ai-assistant", "ai.assistant"))
            .with(Assistant, ProbeStrategy::factory("global-language-model", "LanguageModel"))
            .with(Summarizer, ProbeStrategy::property("ai-summarizer", "ai.summarizer"))
            .with(Summarizer, ProbeStrategy::factory("global-summarizer", "Summarizer"))
            .with(
                LanguageDetector,
                ProbeStrategy::property("ai-language-detector", "ai.languageDetector"),
            )
            .with(
                LanguageDetector,
                ProbeStrategy::property(
                    "translation-language-detector",
                    "translation.languageDetector",
                ),
            )
            .with(
                LanguageDetector,
                ProbeStrategy::factory("global-language-detector", "LanguageDetector"),
            )
            .with(Translator, ProbeStrategy::property("ai-translator", "ai.translator"))
            .with(
                Translator,
                ProbeStrategy::property("translation-translator", "translation.translator"),
            )
            .with(Translator, ProbeStrategy::factory("global-translator", "Translator"))
    }
}

/// A resolved host surface for one family.
#[derive(Clone)]
pub struct Binding {
    family: CapabilityFamily,
    strategy: String,
    shape: SurfaceShape,
    handle: Arc<dyn HostBinding>,
}

impl Binding {
    pub fn family(&self) -> CapabilityFamily {
        self.family
    }

    /// Name of the strategy that matched.
    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    pub fn shape(&self) -> SurfaceShape {
        self.shape
    }

    pub fn provider(&self) -> &str {
        self.handle.provider()
    }

    pub fn handle(&self) -> &Arc<dyn HostBinding> {
        &self.handle
    }

    pub fn has_capabilities_probe(&self) -> bool {
        self.handle.has_capabilities_probe()
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("family", &self.family)
            .field("strategy", &self.strategy)
            .field("shape", &self.shape)
            .field("provider", &self.provider())
            .finish()
    }
}

/// Locates the host surface implementing a family.
pub struct BindingResolver {
    host: Arc<dyn HostEnvironment>,
    strategies: StrategyTable,
}

impl BindingResolver {
    pub fn new(host: Arc<dyn HostEnvironment>, strategies: StrategyTable) -> Self {
        Self { host, strategies }
    }

    /// Returns the first present surface for `family`. Only inspects presence.
    pub fn resolve(&self, family: CapabilityFamily) -> Option<Binding> {
        for strategy in self.strategies.strategies(family) {
            if let Some(handle) = self.host.lookup(&strategy.path) {
                debug!(
                    target: "ai_capabilities::resolver",
                    family = family.as_str(),
                    strategy = %strategy.name,
                    path = %strategy.path,
                    "resolved binding"
                );
                return Some(Binding {
                    family,
                    strategy: strategy.name.clone(),
                    shape: strategy.shape,
                    handle,
                });
            }
        }
        debug!(target: "ai_capabilities::resolver", family = family.as_str(), "no binding found");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HostError;
    use crate::host::{CreateOptions, HostSession};
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct NamedBinding(&'static str);

    #[async_trait]
    impl HostBinding for NamedBinding {
        fn provider(&self) -> &str {
            self.0
        }

        async fn create(&self, _options: &CreateOptions) -> Result<HostSession, HostError> {
            Err(HostError::new("create should not be called by the resolver"))
        }
    }

    struct MapHost(HashMap<&'static str, Arc<dyn HostBinding>>);

    impl HostEnvironment for MapHost {
        fn lookup(&self, path: &str) -> Option<Arc<dyn HostBinding>> {
            self.0.get(path).cloned()
        }
    }

    fn host_with(paths: &[&'static str]) -> Arc<dyn HostEnvironment> {
        let map = paths
            .iter()
            .map(|path| (*path, Arc::new(NamedBinding(path)) as Arc<dyn HostBinding>))
            .collect();
        Arc::new(MapHost(map))
    }

    #[test]
    fn property_surface_preferred_over_factory() {
        let resolver = BindingResolver::new(
            host_with(&["Summarizer", "ai.summarizer"]),
            StrategyTable::default(),
        );
        let binding = resolver.resolve(CapabilityFamily::Summarizer).unwrap();
        assert_eq!(binding.strategy(), "ai-summarizer");
        assert_eq!(binding.shape(), SurfaceShape::Property);
        assert_eq!(binding.provider(), "ai.summarizer");
    }

    #[test]
    fn falls_back_to_factory_surface() {
        let resolver = BindingResolver::new(host_with(&["Translator"]), StrategyTable::default());
        let binding = resolver.resolve(CapabilityFamily::Translator).unwrap();
        assert_eq!(binding.shape(), SurfaceShape::Factory);
    }

    #[test]
    fn returns_none_without_matching_surface() {
        let resolver =
            BindingResolver::new(host_with(&["ai.summarizer"]), StrategyTable::default());
        assert!(resolver.resolve(CapabilityFamily::LanguageDetector).is_none());
    }

    #[test]
    fn appended_strategies_extend_discovery() {
        let table = StrategyTable::default().with(
            CapabilityFamily::Assistant,
            ProbeStrategy::factory("vendor-prompt", "vendor.prompt"),
        );
        let resolver = BindingResolver::new(host_with(&["vendor.prompt"]), table);
        let binding = resolver.resolve(CapabilityFamily::Assistant).unwrap();
        assert_eq!(binding.strategy(), "vendor-prompt");
    }
}
