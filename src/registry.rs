//! Cached read path over field metadata.
//!
//! A [`FieldRegistry`] answers "which fields exist in this scope" for the
//! editor and the compiler. Definitions come from a [`FieldSource`] and are
//! cached per scope for [`RegistryConfig::ttl`]. Time is read through a
//! [`Clock`] so expiry can be driven explicitly in tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use crate::mapping::{FieldMapping, SchemaConfig};
use crate::types::FieldDefinition;

/// Failure to load field definitions from a [`FieldSource`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("field source unavailable: {0}")]
    Unavailable(String),

    #[error("invalid field record for scope '{scope}': {reason}")]
    InvalidRecord { scope: String, reason: String },
}

/// Where field definitions are persisted.
pub trait FieldSource: Send + Sync {
    /// Load every field definition of `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the backing store cannot be read.
    fn load_fields(&self, scope: &str) -> Result<Vec<FieldDefinition>, RegistryError>;
}

/// In-memory [`FieldSource`].
#[derive(Debug, Clone, Default)]
pub struct StaticFieldSource {
    fields: Vec<FieldDefinition>,
}

impl StaticFieldSource {
    #[must_use]
    pub fn new(fields: impl IntoIterator<Item = FieldDefinition>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }
}

impl FieldSource for StaticFieldSource {
    fn load_fields(&self, scope: &str) -> Result<Vec<FieldDefinition>, RegistryError> {
        Ok(self
            .fields
            .iter()
            .filter(|f| f.scope_code == scope)
            .cloned()
            .collect())
    }
}

impl<S: FieldSource + ?Sized> FieldSource for Arc<S> {
    fn load_fields(&self, scope: &str) -> Result<Vec<FieldDefinition>, RegistryError> {
        (**self).load_fields(scope)
    }
}

// -- Clocks ------------------------------------------------------------------

/// Monotonic time source for cache expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

// -- Registry ----------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// How long a scope's definitions are served from cache.
    pub ttl: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    fields: Arc<[FieldDefinition]>,
    expires_at: Instant,
}

/// Per-scope TTL cache in front of a [`FieldSource`].
///
/// Fields are ordered by category, then display order. Each scope expires
/// independently.
#[derive(Debug)]
pub struct FieldRegistry<S, C = SystemClock> {
    source: S,
    clock: C,
    config: RegistryConfig,
    cache: RwLock<HashMap<String, CacheEntry>>,
}

impl<S: FieldSource> FieldRegistry<S> {
    #[must_use]
    pub fn new(source: S) -> Self {
        Self::with_clock(source, SystemClock, RegistryConfig::default())
    }
}

impl<S: FieldSource, C: Clock> FieldRegistry<S, C> {
    #[must_use]
    pub fn with_clock(source: S, clock: C, config: RegistryConfig) -> Self {
        Self {
            source,
            clock,
            config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> RegistryConfig {
        self.config
    }

    /// All definitions of `scope`, loading them on a miss or after expiry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the source fails. A failed load leaves
    /// any expired entry in place so the next call retries.
    pub fn fields_for_scope(&self, scope: &str) -> Result<Arc<[FieldDefinition]>, RegistryError> {
        let now = self.clock.now();
        if let Some(entry) = self.cache.read().get(scope) {
            if now < entry.expires_at {
                tracing::debug!(scope, "field cache hit");
                return Ok(Arc::clone(&entry.fields));
            }
            tracing::debug!(scope, "field cache entry expired");
        } else {
            tracing::debug!(scope, "field cache miss");
        }

        let mut fields = self.source.load_fields(scope).map_err(|err| {
            tracing::warn!(scope, error = %err, "failed to load field definitions");
            err
        })?;
        fields.sort_by(|a, b| {
            a.category
                .cmp(&b.category)
                .then(a.display_order.cmp(&b.display_order))
        });
        let fields: Arc<[FieldDefinition]> = fields.into();

        self.cache.write().insert(
            scope.to_owned(),
            CacheEntry {
                fields: Arc::clone(&fields),
                expires_at: now + self.config.ttl,
            },
        );
        tracing::debug!(scope, count = fields.len(), "loaded field definitions");
        Ok(fields)
    }

    /// Definitions of `scope` grouped by category, categories in order of
    /// first appearance.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the source fails.
    pub fn fields_by_category(
        &self,
        scope: &str,
    ) -> Result<Vec<(String, Vec<FieldDefinition>)>, RegistryError> {
        let fields = self.fields_for_scope(scope)?;
        let mut groups: Vec<(String, Vec<FieldDefinition>)> = Vec::new();
        for field in fields.iter() {
            match groups.iter_mut().find(|(c, _)| *c == field.category) {
                Some((_, members)) => members.push(field.clone()),
                None => groups.push((field.category.clone(), vec![field.clone()])),
            }
        }
        Ok(groups)
    }

    /// # Errors
    ///
    /// Returns [`RegistryError`] if the source fails.
    pub fn field_exists(&self, scope: &str, field_id: &str) -> Result<bool, RegistryError> {
        Ok(self.field(scope, field_id)?.is_some())
    }

    /// # Errors
    ///
    /// Returns [`RegistryError`] if the source fails.
    pub fn field(
        &self,
        scope: &str,
        field_id: &str,
    ) -> Result<Option<FieldDefinition>, RegistryError> {
        Ok(self
            .fields_for_scope(scope)?
            .iter()
            .find(|f| f.field_id == field_id)
            .cloned())
    }

    /// Drop every cached scope.
    pub fn clear_cache(&self) {
        self.cache.write().clear();
        tracing::debug!("field cache cleared");
    }

    /// Build a compiler [`FieldMapping`] for `scope` from its definitions.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the source fails.
    pub fn field_mapping(
        &self,
        scope: &str,
        schema: SchemaConfig,
    ) -> Result<FieldMapping, RegistryError> {
        let fields = self.fields_for_scope(scope)?;
        Ok(FieldMapping::from_definitions(
            scope,
            schema,
            fields.iter().cloned(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::types::FieldType;

    struct CountingSource {
        inner: StaticFieldSource,
        loads: AtomicUsize,
    }

    impl FieldSource for CountingSource {
        fn load_fields(&self, scope: &str) -> Result<Vec<FieldDefinition>, RegistryError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.inner.load_fields(scope)
        }
    }

    struct FailingSource;

    impl FieldSource for FailingSource {
        fn load_fields(&self, _scope: &str) -> Result<Vec<FieldDefinition>, RegistryError> {
            Err(RegistryError::Unavailable("database offline".to_owned()))
        }
    }

    fn def(id: &str, category: &str, order: i32) -> FieldDefinition {
        FieldDefinition::new(id, FieldType::Number)
            .with_scope("S")
            .with_category(category)
            .with_display_order(order)
    }

    fn registry() -> FieldRegistry<CountingSource, Arc<ManualClock>> {
        let source = CountingSource {
            inner: StaticFieldSource::new([
                def("income", "Economic", 2),
                def("age", "Demographic", 1),
                def("farmSize", "Economic", 1),
                def("other", "Demographic", 5).with_scope("T"),
            ]),
            loads: AtomicUsize::new(0),
        };
        FieldRegistry::with_clock(source, Arc::new(ManualClock::new()), RegistryConfig::default())
    }

    #[test]
    fn caches_within_ttl() {
        let registry = registry();
        registry.fields_for_scope("S").unwrap();
        registry.fields_for_scope("S").unwrap();
        assert_eq!(registry.source.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reloads_after_ttl() {
        let registry = registry();
        registry.fields_for_scope("S").unwrap();
        registry.clock.advance(Duration::from_secs(59));
        registry.fields_for_scope("S").unwrap();
        assert_eq!(registry.source.loads.load(Ordering::SeqCst), 1);
        registry.clock.advance(Duration::from_secs(1));
        registry.fields_for_scope("S").unwrap();
        assert_eq!(registry.source.loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn clear_cache_forces_reload() {
        let registry = registry();
        registry.fields_for_scope("S").unwrap();
        registry.clear_cache();
        registry.fields_for_scope("S").unwrap();
        assert_eq!(registry.source.loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn scopes_are_cached_independently() {
        let registry = registry();
        assert_eq!(registry.fields_for_scope("S").unwrap().len(), 3);
        assert_eq!(registry.fields_for_scope("T").unwrap().len(), 1);
        assert_eq!(registry.source.loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn groups_by_category_in_order() {
        let registry = registry();
        let groups = registry.fields_by_category("S").unwrap();
        let shape: Vec<(&str, Vec<&str>)> = groups
            .iter()
            .map(|(c, fs)| (c.as_str(), fs.iter().map(|f| f.field_id.as_str()).collect()))
            .collect();
        assert_eq!(
            shape,
            vec![
                ("Demographic", vec!["age"]),
                ("Economic", vec!["farmSize", "income"]),
            ]
        );
    }

    #[test]
    fn lookups() {
        let registry = registry();
        assert!(registry.field_exists("S", "age").unwrap());
        assert!(!registry.field_exists("S", "other").unwrap());
        assert_eq!(registry.field("S", "income").unwrap().unwrap().display_order, 2);
    }

    #[test]
    fn source_failure_propagates() {
        let registry = FieldRegistry::new(FailingSource);
        assert!(matches!(
            registry.fields_for_scope("S"),
            Err(RegistryError::Unavailable(_))
        ));
    }

    #[test]
    fn builds_field_mapping() {
        let registry = registry();
        let mapping = registry.field_mapping("S", SchemaConfig::default()).unwrap();
        assert_eq!(mapping.scope_code(), "S");
        assert_eq!(mapping.len(), 3);
        assert_eq!(mapping.column_expression("age").as_deref(), Some("b.c_age"));
    }
}
