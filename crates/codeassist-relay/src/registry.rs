use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;

use crate::errors::RelayError;
use crate::model::ProviderId;
use crate::provider::LlmProvider;
use crate::vendors::gemini::{GEMINI_API_KEY_ENV, GEMINI_PROVIDER};
use crate::vendors::github::{GITHUB_PROVIDER, GITHUB_TOKEN_ENV};

/// Built-in providers in default-selection order, with the variable that enables each.
const BUILTIN_PROVIDERS: [(&str, &str); 2] = [
    (GEMINI_PROVIDER, GEMINI_API_KEY_ENV),
    (GITHUB_PROVIDER, GITHUB_TOKEN_ENV),
];

fn credential_hint(id: &ProviderId) -> Option<&'static str> {
    BUILTIN_PROVIDERS
        .iter()
        .find(|(name, _)| *name == id.as_str())
        .map(|(_, env)| *env)
}

/// A configured provider as reported to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProviderInfo {
    pub id: ProviderId,
    pub model: String,
}

/// Summary of the registry, served by the providers endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RegistryDescription {
    pub default: Option<ProviderId>,
    pub providers: Vec<ProviderInfo>,
}

struct RegistryInner {
    providers: HashMap<ProviderId, Arc<dyn LlmProvider>>,
    order: Vec<ProviderId>,
    default: Option<ProviderId>,
}

/// Immutable set of configured providers. Cheap to clone.
#[derive(Clone)]
pub struct ProviderRegistry {
    inner: Arc<RegistryInner>,
}

impl ProviderRegistry {
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::default()
    }

    /// Returns the provider named by the request, or the default one.
    pub fn resolve(&self, id: Option<&ProviderId>) -> Result<Arc<dyn LlmProvider>, RelayError> {
        let id = match id {
            Some(id) => id,
            None => self.inner.default.as_ref().ok_or_else(|| {
                RelayError::configuration(
                    "no AI provider configured; set GEMINI_API_KEY or GITHUB_TOKEN",
                )
            })?,
        };
        if let Some(provider) = self.inner.providers.get(id) {
            return Ok(provider.clone());
        }
        match credential_hint(id) {
            Some(env) => Err(RelayError::configuration(format!(
                "provider {id} is not configured; set {env}"
            ))),
            None => Err(RelayError::validation(format!("unknown provider: {id}"))),
        }
    }

    pub fn default_provider(&self) -> Option<&ProviderId> {
        self.inner.default.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.providers.is_empty()
    }

    pub fn describe(&self) -> RegistryDescription {
        RegistryDescription {
            default: self.inner.default.clone(),
            providers: self
                .inner
                .order
                .iter()
                .filter_map(|id| self.inner.providers.get(id))
                .map(|provider| ProviderInfo {
                    id: provider.id(),
                    model: provider.default_model().to_string(),
                })
                .collect(),
        }
    }
}

/// Collects providers before freezing them into a [`ProviderRegistry`].
#[derive(Default)]
pub struct ProviderRegistryBuilder {
    providers: Vec<Arc<dyn LlmProvider>>,
    preferred_default: Option<ProviderId>,
}

impl ProviderRegistryBuilder {
    /// Registers a provider. Registration order decides the default when none
    /// is preferred explicitly.
    pub fn register_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Provider used when a request does not name one.
    pub fn default_provider(mut self, id: impl Into<ProviderId>) -> Self {
        self.preferred_default = Some(id.into());
        self
    }

    /// Builds the registry, rejecting duplicate ids.
    ///
    /// A preferred default that was never registered is kept so that
    /// requests relying on it fail with a configuration error.
    pub fn build(self) -> Result<ProviderRegistry, RelayError> {
        let mut providers = HashMap::new();
        let mut order = Vec::with_capacity(self.providers.len());
        let mut seen = HashSet::new();
        for provider in self.providers {
            let id = provider.id();
            if !seen.insert(id.clone()) {
                return Err(RelayError::configuration(format!(
                    "duplicate provider registration: {id}"
                )));
            }
            order.push(id.clone());
            providers.insert(id, provider);
        }
        let default = self.preferred_default.or_else(|| order.first().cloned());
        Ok(ProviderRegistry {
            inner: Arc::new(RegistryInner {
                providers,
                order,
                default,
            }),
        })
    }
}
