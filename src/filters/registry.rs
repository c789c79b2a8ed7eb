use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::filters::{Filter, FilterKind, IdentityFilter, RecipeFilter};

type FilterFactory = Box<dyn Fn() -> Arc<dyn Filter> + Send + Sync>;

/// Registry for the available frame filters
///
/// Filters are registered by token; resolving a token that is not
/// registered yields the identity filter rather than an error.
pub struct FilterRegistry {
    filters: HashMap<String, FilterFactory>,
}

impl FilterRegistry {
    /// Create a new registry with all built-in filters
    pub fn new() -> Self {
        let mut registry = Self {
            filters: HashMap::new(),
        };
        for kind in FilterKind::ALL {
            match kind {
                FilterKind::Identity => registry.register(kind.token(), || Arc::new(IdentityFilter)),
                _ => registry.register(kind.token(), move || Arc::new(RecipeFilter::new(kind))),
            }
        }
        registry
    }

    /// Register a custom filter, replacing any filter with the same token
    pub fn register<S, F>(&mut self, token: S, factory: F)
    where
        S: Into<String>,
        F: Fn() -> Arc<dyn Filter> + Send + Sync + 'static,
    {
        self.filters.insert(token.into(), Box::new(factory));
    }

    /// Get a filter by token, if registered
    pub fn get(&self, token: &str) -> Option<Arc<dyn Filter>> {
        self.filters.get(token).map(|factory| factory())
    }

    /// Get a filter by token, falling back to identity for unknown tokens
    pub fn resolve(&self, token: &str) -> Arc<dyn Filter> {
        self.get(token).unwrap_or_else(|| {
            warn!("Unknown filter '{}', frames will pass through unfiltered", token);
            Arc::new(IdentityFilter)
        })
    }

    /// Registered tokens, sorted
    pub fn available(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self.filters.keys().cloned().collect();
        tokens.sort();
        tokens
    }

    pub fn has(&self, token: &str) -> bool {
        self.filters.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::media::picture::Picture;

    struct Upside;

    impl Filter for Upside {
        fn name(&self) -> &str {
            "upside"
        }

        fn description(&self) -> &str {
            "Flips frames vertically"
        }

        fn apply(&self, picture: &Picture) -> Result<Picture> {
            Ok(Picture::new(image::imageops::flip_vertical(picture.as_image())))
        }
    }

    #[test]
    fn test_builtin_filters_available() {
        let registry = FilterRegistry::new();
        assert!(registry.has("sketch"));
        assert!(registry.has("charcoalSketch"));
        assert!(registry.has("neonSketch"));
        assert_eq!(registry.len(), FilterKind::ALL.len());
    }

    #[test]
    fn test_unknown_token_resolves_to_identity() {
        let registry = FilterRegistry::new();
        assert!(registry.get("unknown").is_none());
        assert_eq!(registry.resolve("unknown").name(), "identity");
        assert_eq!(registry.resolve("inkPen").name(), "inkPen");
    }

    #[test]
    fn test_custom_filter_registration() {
        let mut registry = FilterRegistry::new();
        registry.register("upside", || Arc::new(Upside));

        assert!(registry.has("upside"));
        assert_eq!(registry.len(), FilterKind::ALL.len() + 1);
        assert_eq!(registry.resolve("upside").description(), "Flips frames vertically");
    }
}
