//! Provider selection.

use std::collections::HashMap;
use std::sync::Arc;

use promoreel_models::ProviderKind;

use crate::config::ProviderConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::image_prep::ImagePreparer;
use crate::video::{KlingProvider, RunwayProvider, SeedreamProvider, Veo3Provider, VideoProvider};

/// Video backends keyed by [`ProviderKind`], built once at startup.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn VideoProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every backend from configuration, sharing one image preparer.
    pub fn from_config(config: &ProviderConfig) -> ProviderResult<Self> {
        let images = Arc::new(ImagePreparer::new(config.image.clone())?);
        let mut registry = Self::new();

        registry.register(Arc::new(RunwayProvider::new(
            config.runway.clone(),
            images.clone(),
            config.poll.clone(),
        )?));
        registry.register(Arc::new(Veo3Provider::new(
            config.veo3.clone(),
            images.clone(),
            config.poll.clone(),
        )?));
        registry.register(Arc::new(KlingProvider::new(
            config.kling.clone(),
            config.kling_keys.clone(),
            images.clone(),
            config.poll.clone(),
        )?));
        registry.register(Arc::new(SeedreamProvider::new(
            config.seedream.clone(),
            images,
            config.poll.clone(),
        )?));

        Ok(registry)
    }

    /// Register a backend, replacing any previous one of the same kind.
    pub fn register(&mut self, provider: Arc<dyn VideoProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    pub fn get(&self, kind: ProviderKind) -> ProviderResult<Arc<dyn VideoProvider>> {
        self.providers.get(&kind).cloned().ok_or_else(|| {
            ProviderError::validation(kind.as_str(), "video provider is not registered")
        })
    }

    pub fn kinds(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<_> = self.providers.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.kinds())
            .finish()
    }
}
