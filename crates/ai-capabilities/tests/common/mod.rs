#![allow(dead_code)]

use std::sync::Arc;

use ai_capabilities::{
    CapabilityClient, CapabilityFamily, ClientConfig, ConsentHooks, HostAvailability,
    SimulatedHost, SimulatedSurface,
};

pub const PROVIDER: &str = "chrome-built-in";

pub fn path_for(family: CapabilityFamily) -> &'static str {
    match family {
        CapabilityFamily::Assistant => "ai.languageModel",
        CapabilityFamily::Summarizer => "ai.summarizer",
        CapabilityFamily::LanguageDetector => "ai.languageDetector",
        CapabilityFamily::Translator => "ai.translator",
    }
}

/// Host with one surface for `family` at its property path.
pub fn host_with(
    family: CapabilityFamily,
    availability: HostAvailability,
) -> (Arc<SimulatedHost>, Arc<SimulatedSurface>) {
    let host = Arc::new(SimulatedHost::new());
    let surface = host.install(
        path_for(family),
        SimulatedSurface::new(family, PROVIDER).with_availability(availability),
    );
    (host, surface)
}

pub fn client(host: Arc<SimulatedHost>, hooks: Arc<dyn ConsentHooks>) -> CapabilityClient {
    CapabilityClient::builder(host).with_consent_hooks(hooks).build()
}

pub fn client_with_config(
    host: Arc<SimulatedHost>,
    hooks: Arc<dyn ConsentHooks>,
    config: ClientConfig,
) -> CapabilityClient {
    CapabilityClient::builder(host)
        .with_config(config)
        .with_consent_hooks(hooks)
        .build()
}
