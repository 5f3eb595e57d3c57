//! In-memory entity instances with dirty tracking.

use crate::error::{CoreError, CoreResult};
use crate::schema::EntityDef;
use crate::value::{coerce, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// One in-memory record of an entity type.
///
/// An instance holds its current attribute values and a shadow copy of the
/// values as last persisted (`old_attributes`, `None` until the first load
/// or save). Saving writes only the attributes whose current value differs
/// from the shadow.
///
/// The lifecycle is New (id 0, no shadow) -> Persisted (id assigned,
/// shadow populated) -> Destroyed (terminal).
#[derive(Debug, Clone)]
pub struct Entity {
    def: Arc<EntityDef>,
    values: BTreeMap<String, Value>,
    old_attributes: Option<BTreeMap<String, Value>>,
    cached_refs: HashMap<String, Option<Box<Entity>>>,
    temp_forcesendable: Vec<String>,
    destroyed: bool,
}

impl Entity {
    /// Creates a blank instance of a type. Defaults are applied by the
    /// repository's build path, not here.
    pub(crate) fn new(def: Arc<EntityDef>) -> Self {
        Self {
            def,
            values: BTreeMap::new(),
            old_attributes: None,
            cached_refs: HashMap::new(),
            temp_forcesendable: Vec::new(),
            destroyed: false,
        }
    }

    /// The schema this instance belongs to.
    pub fn def(&self) -> &Arc<EntityDef> {
        &self.def
    }

    /// The entity type name.
    pub fn type_name(&self) -> &str {
        self.def.name()
    }

    /// The assigned id, or 0 when the instance was never saved.
    pub fn id(&self) -> i64 {
        self.get("id").as_int().unwrap_or(0)
    }

    /// Whether an id has been assigned.
    ///
    /// An instance with an id is assumed persisted; existence is not
    /// re-verified before save.
    pub fn has_id(&self) -> bool {
        self.id() != 0
    }

    pub(crate) fn set_id(&mut self, id: i64) {
        self.values.insert("id".to_string(), Value::Int(id));
    }

    /// Reads an attribute. Unset attributes read as null.
    pub fn get(&self, name: &str) -> Value {
        self.values.get(name).cloned().unwrap_or(Value::Null)
    }

    /// Assigns one attribute, coercing the input to the declared kind.
    ///
    /// Assigning any `{assoc}_id` attribute invalidates the memoized
    /// `{assoc}` reference so the next read re-resolves it.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an undeclared attribute name.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> CoreResult<()> {
        let kind = self.def.attr_kind(name).ok_or_else(|| {
            CoreError::configuration(format!(
                "{} has no attribute '{}'",
                self.def.name(),
                name
            ))
        })?;
        let coerced = coerce(kind, value.into(), self.def.boolean_default());
        self.values.insert(name.to_string(), coerced);

        if let Some(stem) = name.strip_suffix("_id") {
            self.cached_refs.remove(stem);
        }
        Ok(())
    }

    /// Bulk-assigns attributes, silently skipping undeclared names.
    ///
    /// This is the load path's tolerance for fields that linger in storage
    /// after an attribute was removed from the schema.
    pub fn assign<I, K>(&mut self, attrs: I) -> CoreResult<()>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        for (name, value) in attrs {
            if self.def.attr_kind(name.as_ref()).is_some() {
                self.set(name.as_ref(), value)?;
            }
        }
        Ok(())
    }

    /// Snapshot of every declared attribute's current value.
    ///
    /// Unset attributes appear as null.
    pub fn attributes(&self) -> BTreeMap<String, Value> {
        self.def
            .attributes()
            .iter()
            .map(|decl| (decl.name.clone(), self.get(&decl.name)))
            .collect()
    }

    /// The shadow copy of attributes as last persisted, if any.
    pub fn old_attributes(&self) -> Option<&BTreeMap<String, Value>> {
        self.old_attributes.as_ref()
    }

    /// Reads an attribute's last-persisted value. Null when the instance
    /// has never been persisted.
    pub fn old_attribute(&self, name: &str) -> Value {
        self.old_attributes
            .as_ref()
            .and_then(|old| old.get(name).cloned())
            .unwrap_or(Value::Null)
    }

    /// Whether one attribute differs from its last-persisted value.
    ///
    /// With no shadow every attribute counts as dirty.
    pub fn dirty(&self, name: &str) -> bool {
        match &self.old_attributes {
            None => true,
            Some(old) => old.get(name).cloned().unwrap_or(Value::Null) != self.get(name),
        }
    }

    /// Whether any declared attribute is dirty.
    pub fn is_modified(&self) -> bool {
        self.def
            .attributes()
            .iter()
            .any(|decl| self.dirty(&decl.name))
    }

    /// Fixes the shadow to the current attributes.
    pub(crate) fn mark_saved(&mut self) {
        self.old_attributes = Some(self.attributes());
    }

    /// Whether this instance has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub(crate) fn mark_destroyed(&mut self) {
        self.destroyed = true;
    }

    /// Marks a name as sendable for this instance only.
    pub fn temporarily_forcesend(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.temp_forcesendable.contains(&name) {
            self.temp_forcesendable.push(name);
        }
    }

    /// Call-scoped forcesendable names.
    pub fn temp_forcesendable(&self) -> &[String] {
        &self.temp_forcesendable
    }

    pub(crate) fn cached_ref(&self, name: &str) -> Option<&Option<Box<Entity>>> {
        self.cached_refs.get(name)
    }

    pub(crate) fn set_cached_ref(&mut self, name: &str, value: Option<Entity>) {
        self.cached_refs
            .insert(name.to_string(), value.map(Box::new));
    }
}

/// Two instances are equal when they are of the same type and share an id.
impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.type_name() == other.type_name() && self.id() == other.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EntityDef;
    use crate::value::AttrKind;

    fn page_def() -> Arc<EntityDef> {
        Arc::new(
            EntityDef::builder("Page")
                .attribute("title", AttrKind::String)
                .attribute("views", AttrKind::Integer)
                .attribute("author_id", AttrKind::Integer)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn set_coerces_to_declared_kind() {
        let mut page = Entity::new(page_def());
        page.set("views", "12abc").unwrap();
        assert_eq!(page.get("views"), Value::Int(12));

        page.set("title", 42).unwrap();
        assert_eq!(page.get("title"), Value::Str("42".to_string()));
    }

    #[test]
    fn set_unknown_attribute_fails() {
        let mut page = Entity::new(page_def());
        let result = page.set("nope", 1);
        assert!(matches!(result, Err(CoreError::Configuration { .. })));
    }

    #[test]
    fn assign_skips_unknown_names() {
        let mut page = Entity::new(page_def());
        page.assign(vec![
            ("title".to_string(), Value::from("home")),
            ("stale_field".to_string(), Value::from("ignored")),
        ])
        .unwrap();
        assert_eq!(page.get("title"), Value::Str("home".to_string()));
    }

    #[test]
    fn new_instance_is_fully_dirty() {
        let mut page = Entity::new(page_def());
        page.set("title", "home").unwrap();
        assert!(page.old_attributes().is_none());
        assert!(page.dirty("title"));
        assert!(page.dirty("views"));
        assert!(page.is_modified());
    }

    #[test]
    fn mark_saved_clears_dirtiness() {
        let mut page = Entity::new(page_def());
        page.set("title", "home").unwrap();
        page.mark_saved();

        assert!(!page.is_modified());
        assert_eq!(page.old_attributes().cloned(), Some(page.attributes()));

        page.set("title", "about").unwrap();
        assert!(page.dirty("title"));
        assert!(!page.dirty("views"));
        assert_eq!(page.old_attribute("title"), Value::Str("home".to_string()));
    }

    #[test]
    fn assigning_foreign_key_invalidates_cached_reference() {
        let mut page = Entity::new(page_def());
        let author = Entity::new(Arc::new(EntityDef::builder("Author").build().unwrap()));
        page.set_cached_ref("author", Some(author));
        assert!(page.cached_ref("author").is_some());

        page.set("author_id", 9).unwrap();
        assert!(page.cached_ref("author").is_none());
    }

    #[test]
    fn equality_is_type_and_id() {
        let def = page_def();
        let mut a = Entity::new(Arc::clone(&def));
        let mut b = Entity::new(Arc::clone(&def));
        a.set_id(4);
        b.set_id(4);
        assert_eq!(a, b);

        b.set("title", "differs").unwrap();
        assert_eq!(a, b);

        b.set_id(5);
        assert_ne!(a, b);
    }

    #[test]
    fn temporary_forcesend_deduplicates() {
        let mut page = Entity::new(page_def());
        page.temporarily_forcesend("views");
        page.temporarily_forcesend("views");
        assert_eq!(page.temp_forcesendable(), ["views".to_string()]);
    }
}
