//! Per-type persistence operations.

use crate::config::Config;
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::keys;
use crate::schema::{EntityDef, SchemaRegistry};
use crate::value::{AttrKind, Value};
use kvrecord_store::KvStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// The outcome of a [`Repository::reconcile`] run.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize)]
pub struct ReconcileOutcome {
    /// Ids created because they were absent from the store.
    pub created: Vec<i64>,
    /// Ids destroyed because they were absent from the external set.
    pub deleted: Vec<i64>,
}

/// All persistence and association operations for one entity type.
///
/// A repository is a cheap handle (a few `Arc` clones) over the shared
/// store and registry; create as many as needed.
///
/// # Consistency
///
/// Each operation maps to a small fixed number of single-key store
/// commands with no cross-key transaction. A crash between the steps of
/// `save` can leave an id reserved without a record, or a record without
/// type-set membership; concurrent saves of the same id race per
/// attribute with last-writer-wins and no version check.
pub struct Repository {
    def: Arc<EntityDef>,
    store: Arc<dyn KvStore>,
    registry: Arc<SchemaRegistry>,
    config: Config,
}

impl Repository {
    pub(crate) fn new(
        def: Arc<EntityDef>,
        store: Arc<dyn KvStore>,
        registry: Arc<SchemaRegistry>,
        config: Config,
    ) -> Self {
        Self {
            def,
            store,
            registry,
            config,
        }
    }

    /// The entity type this repository serves.
    pub fn type_name(&self) -> &str {
        self.def.name()
    }

    /// The schema this repository serves.
    pub fn def(&self) -> &Arc<EntityDef> {
        &self.def
    }

    pub(crate) fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Returns the repository for another registered type.
    pub(crate) fn repo_for(&self, type_name: &str) -> CoreResult<Repository> {
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

    /// Builds an unsaved instance: type defaults first, then the given
    /// attributes. Undeclared names are skipped.
    pub fn build<I, K>(&self, attrs: I) -> CoreResult<Entity>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let mut entity = Entity::new(Arc::clone(&self.def));
        let defaults: Vec<(String, Value)> = self.def.defaults().to_vec();
        entity.assign(defaults)?;
        entity.assign(attrs)?;
        Ok(entity)
    }

    /// Builds and immediately saves an instance.
    pub fn create<I, K>(&self, attrs: I) -> CoreResult<Entity>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let mut entity = self.build(attrs)?;
        self.save(&mut entity)?;
        Ok(entity)
    }

    /// Draws the next id from the per-type counter.
    ///
    /// # Errors
    ///
    /// A non-positive counter result is fatal and reported as an
    /// invalid-identity error.
    pub fn next_id(&self) -> CoreResult<i64> {
        let id = self.store.incr(&keys::counter_key(self.def.name()))?;
        if id <= 0 {
            return Err(CoreError::invalid_identity(self.def.name()));
        }
        Ok(id)
    }

    /// Registers an id in the type-wide id-set.
    ///
    /// # Errors
    ///
    /// Registering a zero id is an invalid-identity error.
    pub fn add_to_type_set(&self, id: i64) -> CoreResult<()> {
        if id == 0 {
            return Err(CoreError::invalid_identity(self.def.name()));
        }
        self.store
            .sadd(&keys::type_set_key(self.def.name()), &id.to_string())?;
        Ok(())
    }

    /// Saves an instance as a diff against its last-persisted state.
    ///
    /// Runs before-save hooks, assigns an id (and type-set membership) on
    /// first save, writes changed fields and deletes nulled ones with the
    /// minimum number of store commands, refreshes the shadow, then runs
    /// after-save hooks.
    ///
    /// # Errors
    ///
    /// Saving a destroyed instance is a precondition error; hook and
    /// store errors propagate.
    pub fn save(&self, entity: &mut Entity) -> CoreResult<()> {
        if entity.is_destroyed() {
            return Err(CoreError::precondition(format!(
                "cannot save destroyed {} {}",
                entity.type_name(),
                entity.id()
            )));
        }
        self.check_type(entity)?;

        for hook in &self.def.hooks().before_save {
            hook(entity)?;
        }

        if !entity.has_id() {
            let id = self.next_id()?;
            entity.set_id(id);
            self.add_to_type_set(id)?;
        }

        let key = keys::record_key(self.def.name(), entity.id());
        let mut writes: Vec<(String, String)> = Vec::new();
        let mut deletions: Vec<String> = Vec::new();
        for (name, value) in entity.attributes() {
            let old = entity.old_attribute(&name);
            if value == old {
                continue;
            }
            match value.encode_field() {
                Some(field) => writes.push((name, field)),
                None => {
                    if !old.is_null() {
                        deletions.push(name);
                    }
                }
            }
        }

        match writes.len() {
            0 => {}
            1 => self.store.hset(&key, &writes[0].0, &writes[0].1)?,
            _ => self.store.hset_multi(&key, &writes)?,
        }
        for field in &deletions {
            self.store.hdel(&key, field)?;
        }

        entity.mark_saved();

        for hook in &self.def.hooks().after_save {
            hook(entity)?;
        }

        debug!(
            type_name = self.def.name(),
            id = entity.id(),
            written = writes.len(),
            deleted = deletions.len(),
            "saved record"
        );
        Ok(())
    }

    /// Bulk-assigns attributes and saves.
    pub fn update_attributes<I, K>(&self, entity: &mut Entity, attrs: I) -> CoreResult<()>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        entity.assign(attrs)?;
        self.save(entity)
    }

    /// Copies an instance's attributes into a fresh unsaved instance with
    /// its own newly drawn id.
    pub fn clone_attributes(&self, entity: &Entity) -> CoreResult<Entity> {
        self.check_type(entity)?;
        let mut copy = self.build(entity.attributes())?;
        let id = self.next_id()?;
        copy.set_id(id);
        Ok(copy)
    }

    fn fetch(&self, id: i64) -> CoreResult<Option<Entity>> {
        let fields = self
            .store
            .hgetall(&keys::record_key(self.def.name(), id))?;
        // Absence of the id field is how "does not exist" reads.
        if !fields.iter().any(|(field, _)| field == "id") {
            return Ok(None);
        }
        let mut entity = Entity::new(Arc::clone(&self.def));
        entity.assign(fields.into_iter().map(|(f, v)| (f, Value::from(v))))?;
        entity.set_id(id);
        entity.mark_saved();
        Ok(Some(entity))
    }

    /// Looks up a record by id, strictly.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if no record exists under the id.
    pub fn find(&self, id: i64) -> CoreResult<Entity> {
        self.fetch(id)?
            .ok_or_else(|| CoreError::not_found(self.def.name(), id))
    }

    /// Looks up a record by id, leniently: a missing record resolves to
    /// `None` (reported, not fatal).
    pub fn try_find(&self, id: i64) -> CoreResult<Option<Entity>> {
        let found = self.fetch(id)?;
        if found.is_none() && self.config.report_missing {
            warn!(type_name = self.def.name(), id, "record missing in lenient lookup");
        }
        Ok(found)
    }

    /// Strictly resolves each id in order.
    ///
    /// # Errors
    ///
    /// Propagates the first not-found error.
    pub fn find_all(&self, ids: &[i64]) -> CoreResult<Vec<Entity>> {
        ids.iter().map(|&id| self.find(id)).collect()
    }

    /// Leniently resolves ids, dropping the missing ones and preserving
    /// input order for the rest.
    pub fn find_existing(&self, ids: &[i64]) -> CoreResult<Vec<Entity>> {
        let mut found = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(entity) = self.try_find(id)? {
                found.push(entity);
            }
        }
        Ok(found)
    }

    /// All ids in the type-set, in the store's enumeration order.
    ///
    /// The order is whatever the store yields; it is not sorted.
    pub fn ids(&self) -> CoreResult<Vec<i64>> {
        let members = self.store.smembers(&keys::type_set_key(self.def.name()))?;
        Ok(members
            .iter()
            .filter_map(|m| m.parse().ok())
            .collect())
    }

    /// All live records, in type-set enumeration order, skipping stale
    /// set entries.
    pub fn all(&self) -> CoreResult<Vec<Entity>> {
        let ids = self.ids()?;
        self.find_existing(&ids)
    }

    /// Cardinality of the type-set.
    pub fn count(&self) -> CoreResult<usize> {
        Ok(self.store.scard(&keys::type_set_key(self.def.name()))?)
    }

    /// The smallest live id, if any.
    pub fn first_id(&self) -> CoreResult<Option<i64>> {
        Ok(self.ids()?.into_iter().min())
    }

    /// The largest live id, if any.
    pub fn last_id(&self) -> CoreResult<Option<i64>> {
        Ok(self.ids()?.into_iter().max())
    }

    /// The record with the smallest id, if any.
    pub fn first(&self) -> CoreResult<Option<Entity>> {
        match self.first_id()? {
            Some(id) => self.try_find(id),
            None => Ok(None),
        }
    }

    /// The record with the largest id, if any.
    pub fn last(&self) -> CoreResult<Option<Entity>> {
        match self.last_id()? {
            Some(id) => self.try_find(id),
            None => Ok(None),
        }
    }

    /// A uniformly-chosen live record, or `None` when the type-set is
    /// empty.
    pub fn rand(&self) -> CoreResult<Option<Entity>> {
        match self
            .store
            .srandmember(&keys::type_set_key(self.def.name()))?
        {
            Some(member) => match member.parse::<i64>() {
                Ok(id) => self.try_find(id),
                Err(_) => Ok(None),
            },
            None => Ok(None),
        }
    }

    /// Destroys an instance: record key, type-set membership, dependent
    /// associations, and inverse membership in parents.
    ///
    /// Dependent-destroy associations are resolved and destroyed
    /// recursively and their association-set keys removed; other
    /// associations are left untouched (their set entries may orphan).
    /// Parent notification is lenient per association: one failed
    /// resolution is logged and the rest still run.
    ///
    /// # Errors
    ///
    /// Destroying an instance with no id, or one already destroyed, is a
    /// precondition error.
    pub fn destroy(&self, entity: &mut Entity) -> CoreResult<()> {
        if !entity.has_id() {
            return Err(CoreError::precondition(format!(
                "cannot destroy unsaved {}",
                entity.type_name()
            )));
        }
        if entity.is_destroyed() {
            return Err(CoreError::precondition(format!(
                "{} {} is already destroyed",
                entity.type_name(),
                entity.id()
            )));
        }
        self.check_type(entity)?;

        for hook in &self.def.hooks().before_destroy {
            hook(entity)?;
        }

        self.store
            .del(&keys::record_key(self.def.name(), entity.id()))?;
        self.store.srem(
            &keys::type_set_key(self.def.name()),
            &entity.id().to_string(),
        )?;

        self.destroy_dependents(entity)?;
        self.notify_parents(entity)?;

        for hook in &self.def.hooks().after_destroy {
            hook(entity)?;
        }

        entity.mark_destroyed();
        debug!(type_name = self.def.name(), id = entity.id(), "destroyed record");
        Ok(())
    }

    /// Leniently destroys each id that still resolves.
    pub fn destroy_ids(&self, ids: &[i64]) -> CoreResult<()> {
        for &id in ids {
            if let Some(mut entity) = self.try_find(id)? {
                self.destroy(&mut entity)?;
            }
        }
        Ok(())
    }

    /// Destroys every record of the type.
    ///
    /// Works in bounded passes over the type-set; more than one pass only
    /// happens when concurrent writers add records mid-run. Stale set
    /// entries with no record behind them are dropped from the set.
    ///
    /// # Errors
    ///
    /// Returns a precondition error if the set is still non-empty after
    /// the configured pass bound.
    pub fn destroy_all(&self) -> CoreResult<()> {
        let set_key = keys::type_set_key(self.def.name());
        for _ in 0..self.config.destroy_all_max_passes {
            let ids = self.ids()?;
            if ids.is_empty() {
                return Ok(());
            }
            for id in ids {
                match self.try_find(id)? {
                    Some(mut entity) => self.destroy(&mut entity)?,
                    None => {
                        self.store.srem(&set_key, &id.to_string())?;
                    }
                }
            }
            if self.count()? == 0 {
                return Ok(());
            }
        }
        Err(CoreError::precondition(format!(
            "destroy_all on {} did not drain the type-set within {} passes",
            self.def.name(),
            self.config.destroy_all_max_passes
        )))
    }

    /// Reconciles a full external record set against the stored one.
    ///
    /// Each external record is updated in place when its id exists and
    /// created under its external id otherwise; stored ids absent from
    /// the external set are destroyed. The per-type counter is advanced
    /// to at least the maximum id seen so future generated ids don't
    /// collide.
    ///
    /// # Errors
    ///
    /// An external record without a positive `id` is a configuration
    /// error.
    pub fn reconcile(&self, records: Vec<BTreeMap<String, Value>>) -> CoreResult<ReconcileOutcome> {
        let mut stale = self.ids()?;
        let mut created = Vec::new();
        let mut max_id: i64 = 0;

        for record in records {
            let id = record
                .get("id")
                .map(|v| {
                    crate::value::coerce(AttrKind::Integer, v.clone(), false)
                        .as_int()
                        .unwrap_or(0)
                })
                .unwrap_or(0);
            if id <= 0 {
                return Err(CoreError::configuration(format!(
                    "reconcile: record for {} has no positive id",
                    self.def.name()
                )));
            }
            max_id = max_id.max(id);

            match self.try_find(id)? {
                Some(mut existing) => {
                    self.update_attributes(&mut existing, record)?;
                    stale.retain(|&s| s != id);
                }
                None => {
                    // The external id is kept, so save skips generation
                    // and the type-set insert must happen here.
                    let mut fresh = self.build(record)?;
                    self.save(&mut fresh)?;
                    self.add_to_type_set(id)?;
                    created.push(id);
                }
            }
        }

        let deleted = stale.clone();
        self.destroy_ids(&stale)?;

        let counter = keys::counter_key(self.def.name());
        let current: i64 = self
            .store
            .get(&counter)?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        if max_id > current {
            self.store.set(&counter, &max_id.to_string())?;
        }

        debug!(
            type_name = self.def.name(),
            created = created.len(),
            deleted = deleted.len(),
            "reconciled external record set"
        );
        Ok(ReconcileOutcome { created, deleted })
    }

    fn check_type(&self, entity: &Entity) -> CoreResult<()> {
        if entity.type_name() == self.def.name() {
            Ok(())
        } else {
            Err(CoreError::configuration(format!(
                "repository for {} cannot operate on a {} instance",
                self.def.name(),
                entity.type_name()
            )))
        }
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("type_name", &self.def.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EntityDef;
    use kvrecord_store::MemoryStore;

    fn registry() -> Arc<SchemaRegistry> {
        let mut registry = SchemaRegistry::new();
        registry.register(
            EntityDef::builder("Page")
                .attribute("title", AttrKind::String)
                .build()
                .unwrap(),
        );
        registry.register(EntityDef::builder("Tag").build().unwrap());
        Arc::new(registry)
    }

    fn repo(registry: &Arc<SchemaRegistry>, store: &Arc<MemoryStore>, name: &str) -> Repository {
        let def = registry.get(name).unwrap();
        Repository::new(
            def,
            Arc::clone(store) as Arc<dyn KvStore>,
            Arc::clone(registry),
            Config::default(),
        )
    }

    #[test]
    fn next_id_is_sequential() {
        let registry = registry();
        let store = Arc::new(MemoryStore::new());
        let pages = repo(&registry, &store, "Page");

        assert_eq!(pages.next_id().unwrap(), 1);
        assert_eq!(pages.next_id().unwrap(), 2);
        // Counters are per type
        assert_eq!(repo(&registry, &store, "Tag").next_id().unwrap(), 1);
    }

    #[test]
    fn zero_id_cannot_join_the_type_set() {
        let registry = registry();
        let store = Arc::new(MemoryStore::new());
        let pages = repo(&registry, &store, "Page");

        assert!(matches!(
            pages.add_to_type_set(0),
            Err(CoreError::InvalidIdentity { .. })
        ));
    }

    #[test]
    fn repository_rejects_foreign_instances() {
        let registry = registry();
        let store = Arc::new(MemoryStore::new());
        let pages = repo(&registry, &store, "Page");
        let tags = repo(&registry, &store, "Tag");

        let mut tag = tags.build(Vec::<(String, Value)>::new()).unwrap();
        assert!(matches!(
            pages.save(&mut tag),
            Err(CoreError::Configuration { .. })
        ));
    }

    #[test]
    fn clean_save_writes_nothing() {
        let registry = registry();
        let store = Arc::new(MemoryStore::new());
        let pages = repo(&registry, &store, "Page");

        let mut page = pages
            .create(vec![("title".to_string(), Value::from("home"))])
            .unwrap();
        let key = keys::record_key("Page", page.id());
        store.hset(&key, "title", "tampered").unwrap();

        pages.save(&mut page).unwrap();
        assert_eq!(store.hget(&key, "title").unwrap().as_deref(), Some("tampered"));
    }
}
