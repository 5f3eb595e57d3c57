//! The database handle tying a store to a schema registry.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::repo::Repository;
use crate::schema::SchemaRegistry;
use kvrecord_store::KvStore;
use std::sync::Arc;

/// A record database: one backing store plus the registered schemas.
///
/// The database validates the registry once at construction and then
/// hands out per-type [`Repository`] handles. It holds no locks and no
/// per-request state; handles can be created freely and used from any
/// thread.
///
/// # Example
///
/// ```rust,ignore
/// let mut registry = SchemaRegistry::new();
/// registry.register(EntityDef::builder("Page")
///     .attribute("title", AttrKind::String)
///     .build()?);
///
/// let db = Database::new(Arc::new(MemoryStore::new()), registry)?;
/// let pages = db.repository("Page")?;
/// let page = pages.create(vec![("title".to_string(), Value::from("home"))])?;
/// ```
pub struct Database {
    store: Arc<dyn KvStore>,
    registry: Arc<SchemaRegistry>,
    config: Config,
}

impl Database {
    /// Opens a database over a store with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the registry fails validation
    /// (unknown association targets, undeclared through-associations).
    pub fn new(store: Arc<dyn KvStore>, registry: SchemaRegistry) -> CoreResult<Self> {
        Self::with_config(store, registry, Config::default())
    }

    /// Opens a database with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the registry fails validation.
    pub fn with_config(
        store: Arc<dyn KvStore>,
        registry: SchemaRegistry,
        config: Config,
    ) -> CoreResult<Self> {
        registry.validate()?;
        Ok(Self {
            store,
            registry: Arc::new(registry),
            config,
        })
    }

    /// Returns the repository for a registered entity type.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unregistered type name.
    pub fn repository(&self, type_name: &str) -> CoreResult<Repository> {
        let def = self.registry.get(type_name).ok_or_else(|| {
            CoreError::configuration(format!("unknown entity type '{type_name}'"))
        })?;
        Ok(Repository::new(
            def,
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            self.config.clone(),
        ))
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// The schema registry.
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// The engine configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("types", &self.registry.type_names())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AssocOpts, EntityDef};
    use kvrecord_store::MemoryStore;

    #[test]
    fn unknown_repository_is_configuration_error() {
        let db = Database::new(Arc::new(MemoryStore::new()), SchemaRegistry::new()).unwrap();
        assert!(matches!(
            db.repository("Ghost"),
            Err(CoreError::Configuration { .. })
        ));
    }

    #[test]
    fn construction_validates_registry() {
        let mut registry = SchemaRegistry::new();
        registry.register(
            EntityDef::builder("Book")
                .has_many("chapters", AssocOpts::new())
                .build()
                .unwrap(),
        );
        // "Chapter" is not registered
        let result = Database::new(Arc::new(MemoryStore::new()), registry);
        assert!(matches!(result, Err(CoreError::Configuration { .. })));
    }
}
