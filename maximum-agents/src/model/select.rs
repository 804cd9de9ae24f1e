//! Model selection: from a model name to the invoker backing a run.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::{CachePolicy, CachingModel, RetryPolicy, RetryingModel, SharedModel};
use crate::error::Result;
use crate::providers::{AnthropicModel, OpenAiModel};

/// Builds the base transport for a model name.
pub trait ModelFactory: Send + Sync {
    /// Create the transport for `model`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be configured, for instance
    /// when its API key is missing.
    fn create(&self, model: &str) -> Result<SharedModel>;
}

impl<F> ModelFactory for F
where
    F: Fn(&str) -> Result<SharedModel> + Send + Sync,
{
    fn create(&self, model: &str) -> Result<SharedModel> {
        self(model)
    }
}

/// Routes model names to hosted providers.
///
/// Names containing the provider marker go to Anthropic, everything else to
/// an OpenAI-compatible endpoint. A leading `provider/` prefix is stripped.
#[derive(Debug, Clone)]
pub struct ProviderFactory {
    marker: String,
}

impl Default for ProviderFactory {
    fn default() -> Self {
        Self::new("anthropic")
    }
}

impl ProviderFactory {
    /// Create a factory with the given Anthropic marker.
    #[must_use]
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    /// Strip a leading `provider/` prefix.
    #[must_use]
    pub fn bare_name(model: &str) -> &str {
        model.split_once('/').map_or(model, |(_, name)| name)
    }
}

impl ModelFactory for ProviderFactory {
    fn create(&self, model: &str) -> Result<SharedModel> {
        let name = Self::bare_name(model);
        if model.contains(&self.marker) {
            Ok(Arc::new(AnthropicModel::from_env(name)?))
        } else {
            Ok(Arc::new(OpenAiModel::from_env(name)?))
        }
    }
}

/// The selection used when no model-selection hook is registered.
///
/// Every transport is wrapped in a [`RetryingModel`]; names containing the
/// marker are additionally wrapped in a [`CachingModel`].
#[derive(Clone)]
pub struct DefaultSelector {
    factory: Arc<dyn ModelFactory>,
    marker: String,
    retry: RetryPolicy,
    cache: CachePolicy,
}

impl fmt::Debug for DefaultSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultSelector")
            .field("marker", &self.marker)
            .field("retry", &self.retry)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl DefaultSelector {
    /// Select the invoker for `model`.
    ///
    /// # Errors
    ///
    /// Propagates factory errors.
    pub fn select(&self, model: &str) -> Result<SharedModel> {
        let base = self.factory.create(model)?;
        let provider = base.provider_name();
        let retrying = RetryingModel::new(base, self.retry.clone());
        if model.contains(&self.marker) {
            debug!(model, provider, "Selected caching model");
            Ok(Arc::new(CachingModel::new(retrying, self.cache)))
        } else {
            debug!(model, provider, "Selected retrying model");
            Ok(Arc::new(retrying))
        }
    }
}

/// Build the default selector.
#[must_use]
pub fn default_selector(
    factory: Arc<dyn ModelFactory>,
    marker: impl Into<String>,
    retry: RetryPolicy,
    cache: CachePolicy,
) -> DefaultSelector {
    DefaultSelector {
        factory,
        marker: marker.into(),
        retry,
        cache,
    }
}
