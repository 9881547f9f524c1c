//! Metadata provider boundary
//!
//! Providers look up enrichment for newly cataloged titles. Text fields are
//! resolved synchronously during title creation; the cover is fetched by a
//! detached task afterwards so indexing never waits on it.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Enrichment returned by a provider for one title
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleMetadata {
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub cover_url: Option<String>,
}

/// A source of title enrichment.
#[async_trait]
pub trait MetadataProvider: Send + Sync + 'static {
    /// Provider name used by library overrides (e.g. "anilist").
    fn name(&self) -> &str;

    /// Best match for a cleaned title name, or `None` when nothing matched.
    async fn find_best_match(&self, cleaned_name: &str) -> Result<Option<TitleMetadata>>;

    /// Fetch the cover for a match and return the stored cover reference.
    async fn fetch_cover(&self, metadata: &TitleMetadata) -> Result<Option<String>>;
}

/// Provider that never matches. Used when no lookup service is configured.
#[derive(Debug, Default)]
pub struct NoopProvider;

#[async_trait]
impl MetadataProvider for NoopProvider {
    fn name(&self) -> &str {
        "none"
    }

    async fn find_best_match(&self, _cleaned_name: &str) -> Result<Option<TitleMetadata>> {
        Ok(None)
    }

    async fn fetch_cover(&self, _metadata: &TitleMetadata) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Named providers plus the default used when a library has no override.
pub struct MetadataRegistry {
    default: Arc<dyn MetadataProvider>,
    providers: HashMap<String, Arc<dyn MetadataProvider>>,
}

impl MetadataRegistry {
    pub fn new(default: Arc<dyn MetadataProvider>) -> Self {
        let mut providers = HashMap::new();
        providers.insert(default.name().to_string(), Arc::clone(&default));
        Self { default, providers }
    }

    pub fn with_provider(mut self, provider: Arc<dyn MetadataProvider>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    /// Provider for a library's override, falling back to the default for
    /// unknown names.
    pub fn for_library(&self, override_name: Option<&str>) -> Arc<dyn MetadataProvider> {
        match override_name.and_then(|name| self.providers.get(name)) {
            Some(provider) => Arc::clone(provider),
            None => {
                if let Some(name) = override_name {
                    tracing::debug!(provider = %name, "Unknown metadata provider, using default");
                }
                Arc::clone(&self.default)
            }
        }
    }
}

impl Default for MetadataRegistry {
    fn default() -> Self {
        Self::new(Arc::new(NoopProvider))
    }
}

impl std::fmt::Debug for MetadataRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.providers.keys().collect();
        names.sort();
        f.debug_struct("MetadataRegistry")
            .field("default", &self.default.name())
            .field("providers", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    #[async_trait]
    impl MetadataProvider for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn find_best_match(&self, cleaned_name: &str) -> Result<Option<TitleMetadata>> {
            Ok(Some(TitleMetadata {
                name: cleaned_name.to_uppercase(),
                ..Default::default()
            }))
        }

        async fn fetch_cover(&self, _metadata: &TitleMetadata) -> Result<Option<String>> {
            Ok(Some("covers/fixed.jpg".into()))
        }
    }

    #[tokio::test]
    async fn test_noop_never_matches() {
        assert!(NoopProvider.find_best_match("Berserk").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_registry_resolves_overrides() {
        let registry = MetadataRegistry::default().with_provider(Arc::new(Fixed));

        assert_eq!(registry.for_library(None).name(), "none");
        assert_eq!(registry.for_library(Some("fixed")).name(), "fixed");
        assert_eq!(registry.for_library(Some("missing")).name(), "none");

        let matched = registry
            .for_library(Some("fixed"))
            .find_best_match("berserk")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(matched.name, "BERSERK");
    }
}
