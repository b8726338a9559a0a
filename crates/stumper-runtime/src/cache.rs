//! Validation cache.
//!
//! A validate-only pre-flight followed by a full run would otherwise ask the
//! judge about every unchanged question twice. Only results produced from a
//! model reply are stored; transport failures never are.

use moka::future::Cache;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Duration;
use stumper_core::{IssueTaxonomy, ValidationResult};

use crate::config::CacheConfig;

/// Everything a validation verdict depends on.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ValidationKey {
    question: String,
    answer: String,
    context_hash: u64,
    module: Option<String>,
    taxonomy: IssueTaxonomy,
}

impl ValidationKey {
    pub fn new(
        question: &str,
        answer: &str,
        context_excerpt: Option<&str>,
        module: Option<&str>,
        taxonomy: IssueTaxonomy,
    ) -> Self {
        Self {
            question: question.to_string(),
            answer: answer.to_string(),
            context_hash: hash_excerpt(context_excerpt),
            module: module.map(str::to_string),
            taxonomy,
        }
    }
}

fn hash_excerpt(excerpt: Option<&str>) -> u64 {
    let mut hasher = DefaultHasher::new();
    excerpt.hash(&mut hasher);
    hasher.finish()
}

/// In-memory cache of validator results.
pub struct ValidationCache {
    cache: Cache<ValidationKey, ValidationResult>,
}

impl ValidationCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    /// Build from configuration; `None` when caching is disabled.
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(config.max_entries, config.ttl))
    }

    pub async fn get(&self, key: &ValidationKey) -> Option<ValidationResult> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: ValidationKey, result: ValidationResult) {
        self.cache.insert(key, result).await;
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for ValidationCache {
    fn default() -> Self {
        Self::new(1_000, Duration::from_secs(3600))
    }
}
