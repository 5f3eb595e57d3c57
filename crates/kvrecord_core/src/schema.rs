//! Entity type declarations and the schema registry.
//!
//! Each entity type is described once by an [`EntityDef`] built through
//! [`EntityDefBuilder`] and registered in a [`SchemaRegistry`]. The
//! registry is an explicit object passed wherever resolution is needed;
//! there is no ambient global type table.

use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::keys;
use crate::value::{AttrKind, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A lifecycle hook invoked by the persistence engine.
///
/// Hook failures propagate to the caller uncaught; they are programmer
/// errors, not part of the recoverable taxonomy.
pub type Hook = Box<dyn Fn(&mut Entity) -> CoreResult<()> + Send + Sync>;

/// Registered lifecycle hooks for one entity type, in registration order.
#[derive(Default)]
pub struct Hooks {
    /// Run at the start of every save.
    pub before_save: Vec<Hook>,
    /// Run after the save completed and the shadow was refreshed.
    pub after_save: Vec<Hook>,
    /// Run before a destroy starts removing state.
    pub before_destroy: Vec<Hook>,
    /// Run after a destroy finished.
    pub after_destroy: Vec<Hook>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("before_save", &self.before_save.len())
            .field("after_save", &self.after_save.len())
            .field("before_destroy", &self.before_destroy.len())
            .field("after_destroy", &self.after_destroy.len())
            .finish()
    }
}

/// One declared persistent attribute.
#[derive(Debug, Clone)]
pub struct AttrDecl {
    /// Attribute name.
    pub name: String,
    /// Declared kind, applied on every assignment.
    pub kind: AttrKind,
}

/// The kind of an association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssocKind {
    /// Owner's association set holds many member ids.
    HasMany,
    /// Owner's association set holds at most one member id.
    HasOne,
    /// Owner references its target through a `{name}_id` attribute.
    BelongsTo,
}

/// How an association resolves its target entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A fixed, explicitly named type.
    Explicit(String),
    /// The concrete type name is read from the owner's `{name}_type`
    /// attribute at resolution time.
    Polymorphic,
    /// Derived from the association name by singularizing and
    /// Pascal-casing it.
    Inferred,
}

/// What happens to related records when the owner is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependent {
    /// Related records are left alone; set entries may be orphaned.
    None,
    /// Related records are destroyed recursively.
    Destroy,
}

/// One declared association.
#[derive(Debug, Clone)]
pub struct AssocDecl {
    /// Association name.
    pub name: String,
    /// Association kind.
    pub kind: AssocKind,
    /// Target type resolution rule.
    pub target: Target,
    /// Dependent-object policy.
    pub dependent: Dependent,
    /// For a through-association, the name of the association it
    /// traverses first.
    pub through: Option<String>,
}

impl AssocDecl {
    /// Whether this is a `has_many ... through` composition.
    pub fn is_through(&self) -> bool {
        self.through.is_some()
    }
}

/// Options for declaring an association.
#[derive(Debug, Clone, Default)]
pub struct AssocOpts {
    target: Option<String>,
    polymorphic: bool,
    dependent_destroy: bool,
    through: Option<String>,
}

impl AssocOpts {
    /// Creates the default options: inferred target, no dependent policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an explicit target type name.
    #[must_use]
    pub fn target(mut self, type_name: impl Into<String>) -> Self {
        self.target = Some(type_name.into());
        self
    }

    /// Marks the association polymorphic; the target type is read from
    /// the owner's `{name}_type` attribute.
    #[must_use]
    pub fn polymorphic(mut self) -> Self {
        self.polymorphic = true;
        self
    }

    /// Destroys related records when the owner is destroyed.
    #[must_use]
    pub fn dependent_destroy(mut self) -> Self {
        self.dependent_destroy = true;
        self
    }

    /// Composes through another association of the same owner.
    #[must_use]
    pub fn through(mut self, assoc_name: impl Into<String>) -> Self {
        self.through = Some(assoc_name.into());
        self
    }

    fn into_decl(self, name: &str, kind: AssocKind) -> AssocDecl {
        let target = if self.polymorphic {
            Target::Polymorphic
        } else if let Some(explicit) = self.target {
            Target::Explicit(explicit)
        } else {
            Target::Inferred
        };
        AssocDecl {
            name: name.to_string(),
            kind,
            target,
            dependent: if self.dependent_destroy {
                Dependent::Destroy
            } else {
                Dependent::None
            },
            through: self.through,
        }
    }
}

/// The schema of one entity type.
///
/// Every type implicitly carries an integer `id` attribute; declaring it
/// explicitly is a configuration error.
#[derive(Debug)]
pub struct EntityDef {
    name: String,
    attributes: Vec<AttrDecl>,
    defaults: Vec<(String, Value)>,
    associations: Vec<AssocDecl>,
    unsendable: Vec<String>,
    forcesendable: Vec<String>,
    boolean_default: bool,
    hooks: Hooks,
}

impl EntityDef {
    /// Starts declaring a new entity type.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> EntityDefBuilder {
        EntityDefBuilder {
            name: name.into(),
            attributes: vec![AttrDecl {
                name: "id".to_string(),
                kind: AttrKind::Integer,
            }],
            defaults: Vec::new(),
            associations: Vec::new(),
            unsendable: Vec::new(),
            forcesendable: Vec::new(),
            boolean_default: false,
            hooks: Hooks::default(),
            explicit_id: false,
        }
    }

    /// The type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared attributes, `id` included, in declaration order.
    pub fn attributes(&self) -> &[AttrDecl] {
        &self.attributes
    }

    /// Looks up the declared kind of an attribute.
    pub fn attr_kind(&self, name: &str) -> Option<AttrKind> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.kind)
    }

    /// Default attribute values applied at instantiation.
    pub fn defaults(&self) -> &[(String, Value)] {
        &self.defaults
    }

    /// Declared associations in declaration order.
    pub fn associations(&self) -> &[AssocDecl] {
        &self.associations
    }

    /// Looks up an association declaration by name.
    pub fn association(&self, name: &str) -> Option<&AssocDecl> {
        self.associations.iter().find(|a| a.name == name)
    }

    /// Attribute names never emitted by the marshaller.
    pub fn unsendable(&self) -> &[String] {
        &self.unsendable
    }

    /// Names always offered to the marshaller even when not persistent.
    pub fn forcesendable(&self) -> &[String] {
        &self.forcesendable
    }

    /// The value a null boolean input coerces to.
    pub fn boolean_default(&self) -> bool {
        self.boolean_default
    }

    /// Lifecycle hooks for this type.
    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }
}

/// Builder for [`EntityDef`].
pub struct EntityDefBuilder {
    name: String,
    attributes: Vec<AttrDecl>,
    defaults: Vec<(String, Value)>,
    associations: Vec<AssocDecl>,
    unsendable: Vec<String>,
    forcesendable: Vec<String>,
    boolean_default: bool,
    hooks: Hooks,
    explicit_id: bool,
}

impl EntityDefBuilder {
    /// Declares a persistent attribute.
    ///
    /// Re-declaring an existing name is a no-op. Declaring `id` is
    /// rejected at [`build`](Self::build) time; it is implicit.
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, kind: AttrKind) -> Self {
        let name = name.into();
        if name == "id" {
            self.explicit_id = true;
            return self;
        }
        if !self.attributes.iter().any(|a| a.name == name) {
            self.attributes.push(AttrDecl { name, kind });
        }
        self
    }

    /// Sets a default value applied when an instance is built.
    #[must_use]
    pub fn default_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.defaults.push((name.into(), value));
        self
    }

    /// Sets the value null boolean input coerces to for this type.
    #[must_use]
    pub fn boolean_default(mut self, default: bool) -> Self {
        self.boolean_default = default;
        self
    }

    /// Declares a one-to-many association.
    #[must_use]
    pub fn has_many(self, name: &str, opts: AssocOpts) -> Self {
        self.register(name, AssocKind::HasMany, opts)
    }

    /// Declares a one-to-one association.
    #[must_use]
    pub fn has_one(self, name: &str, opts: AssocOpts) -> Self {
        self.register(name, AssocKind::HasOne, opts)
    }

    /// Declares a reference to a parent via the `{name}_id` attribute.
    #[must_use]
    pub fn belongs_to(self, name: &str, opts: AssocOpts) -> Self {
        self.register(name, AssocKind::BelongsTo, opts)
    }

    fn register(mut self, name: &str, kind: AssocKind, opts: AssocOpts) -> Self {
        // Re-registering a name already present is a no-op.
        if self.associations.iter().any(|a| a.name == name) {
            return self;
        }
        self.associations.push(opts.into_decl(name, kind));
        self
    }

    /// Excludes an attribute or association from the wire format.
    #[must_use]
    pub fn unsendable(mut self, name: impl Into<String>) -> Self {
        self.unsendable.push(name.into());
        self
    }

    /// Forces a name into the wire format even when not persistent.
    #[must_use]
    pub fn forcesendable(mut self, name: impl Into<String>) -> Self {
        self.forcesendable.push(name.into());
        self
    }

    /// Registers a before-save hook.
    #[must_use]
    pub fn before_save(mut self, hook: impl Fn(&mut Entity) -> CoreResult<()> + Send + Sync + 'static) -> Self {
        self.hooks.before_save.push(Box::new(hook));
        self
    }

    /// Registers an after-save hook.
    #[must_use]
    pub fn after_save(mut self, hook: impl Fn(&mut Entity) -> CoreResult<()> + Send + Sync + 'static) -> Self {
        self.hooks.after_save.push(Box::new(hook));
        self
    }

    /// Registers a before-destroy hook.
    #[must_use]
    pub fn before_destroy(mut self, hook: impl Fn(&mut Entity) -> CoreResult<()> + Send + Sync + 'static) -> Self {
        self.hooks.before_destroy.push(Box::new(hook));
        self
    }

    /// Registers an after-destroy hook.
    #[must_use]
    pub fn after_destroy(mut self, hook: impl Fn(&mut Entity) -> CoreResult<()> + Send + Sync + 'static) -> Self {
        self.hooks.after_destroy.push(Box::new(hook));
        self
    }

    /// Finalizes the declaration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `id` was declared explicitly or a
    /// through-association is declared with a dependent or polymorphic
    /// option that cannot apply to it.
    pub fn build(self) -> CoreResult<EntityDef> {
        if self.explicit_id {
            return Err(CoreError::configuration(format!(
                "{}: do not declare 'id' as an attribute; it is added by default",
                self.name
            )));
        }
        for assoc in &self.associations {
            if assoc.is_through() && assoc.kind != AssocKind::HasMany {
                return Err(CoreError::configuration(format!(
                    "{}.{}: only has_many associations can go through another",
                    self.name, assoc.name
                )));
            }
        }
        Ok(EntityDef {
            name: self.name,
            attributes: self.attributes,
            defaults: self.defaults,
            associations: self.associations,
            unsendable: self.unsendable,
            forcesendable: self.forcesendable,
            boolean_default: self.boolean_default,
            hooks: self.hooks,
        })
    }
}

/// All registered entity types, keyed by type name.
///
/// Built once at startup and shared behind an `Arc`; association target
/// names are checked by [`validate`](Self::validate) at registration time
/// rather than on every resolution.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    defs: HashMap<String, Arc<EntityDef>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity type. Registering a name twice replaces the
    /// earlier definition.
    pub fn register(&mut self, def: EntityDef) {
        self.defs.insert(def.name().to_string(), Arc::new(def));
    }

    /// Looks up a type by name.
    pub fn get(&self, name: &str) -> Option<Arc<EntityDef>> {
        self.defs.get(name).cloned()
    }

    /// Returns all registered type names.
    pub fn type_names(&self) -> Vec<&str> {
        self.defs.keys().map(String::as_str).collect()
    }

    /// Checks every non-polymorphic association target against the
    /// registered types.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first association whose
    /// target type is unknown or whose through-association is undeclared.
    pub fn validate(&self) -> CoreResult<()> {
        for def in self.defs.values() {
            for assoc in def.associations() {
                if let Some(through) = &assoc.through {
                    if def.association(through).is_none() {
                        return Err(CoreError::configuration(format!(
                            "{}.{}: through-association '{}' is not declared",
                            def.name(),
                            assoc.name,
                            through
                        )));
                    }
                    // The terminal target resolves per intermediate type
                    // at call time.
                    continue;
                }
                let target = match &assoc.target {
                    Target::Polymorphic => continue,
                    Target::Explicit(name) => name.clone(),
                    Target::Inferred => keys::infer_type_name(&assoc.name),
                };
                if !self.defs.contains_key(&target) {
                    return Err(CoreError::configuration(format!(
                        "{}.{}: association target type '{}' is not registered",
                        def.name(),
                        assoc.name,
                        target
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_id_is_rejected() {
        let result = EntityDef::builder("Page")
            .attribute("id", AttrKind::Integer)
            .build();
        assert!(matches!(result, Err(CoreError::Configuration { .. })));
    }

    #[test]
    fn id_is_implicit() {
        let def = EntityDef::builder("Page").build().unwrap();
        assert_eq!(def.attr_kind("id"), Some(AttrKind::Integer));
    }

    #[test]
    fn duplicate_attribute_is_noop() {
        let def = EntityDef::builder("Page")
            .attribute("title", AttrKind::String)
            .attribute("title", AttrKind::Integer)
            .build()
            .unwrap();
        assert_eq!(def.attr_kind("title"), Some(AttrKind::String));
        assert_eq!(def.attributes().len(), 2);
    }

    #[test]
    fn duplicate_association_is_noop() {
        let def = EntityDef::builder("Book")
            .has_many("chapters", AssocOpts::new().dependent_destroy())
            .has_many("chapters", AssocOpts::new())
            .build()
            .unwrap();
        assert_eq!(def.associations().len(), 1);
        assert_eq!(
            def.association("chapters").unwrap().dependent,
            Dependent::Destroy
        );
    }

    #[test]
    fn through_requires_has_many() {
        let result = EntityDef::builder("Book")
            .has_one("publisher", AssocOpts::new().through("contract"))
            .build();
        assert!(matches!(result, Err(CoreError::Configuration { .. })));
    }

    #[test]
    fn validate_accepts_known_targets() {
        let mut registry = SchemaRegistry::new();
        registry.register(
            EntityDef::builder("Book")
                .has_many("chapters", AssocOpts::new())
                .belongs_to("author", AssocOpts::new())
                .build()
                .unwrap(),
        );
        registry.register(EntityDef::builder("Chapter").build().unwrap());
        registry.register(EntityDef::builder("Author").build().unwrap());
        registry.validate().unwrap();
    }

    #[test]
    fn validate_rejects_unknown_inferred_target() {
        let mut registry = SchemaRegistry::new();
        registry.register(
            EntityDef::builder("Book")
                .has_many("chapters", AssocOpts::new())
                .build()
                .unwrap(),
        );
        assert!(matches!(
            registry.validate(),
            Err(CoreError::Configuration { .. })
        ));
    }

    #[test]
    fn validate_rejects_unknown_explicit_target() {
        let mut registry = SchemaRegistry::new();
        registry.register(
            EntityDef::builder("Book")
                .has_one("cover", AssocOpts::new().target("CoverImage"))
                .build()
                .unwrap(),
        );
        assert!(matches!(
            registry.validate(),
            Err(CoreError::Configuration { .. })
        ));
    }

    #[test]
    fn validate_skips_polymorphic_targets() {
        let mut registry = SchemaRegistry::new();
        registry.register(
            EntityDef::builder("Comment")
                .attribute("subject_id", AttrKind::Integer)
                .attribute("subject_type", AttrKind::String)
                .belongs_to("subject", AssocOpts::new().polymorphic())
                .build()
                .unwrap(),
        );
        registry.validate().unwrap();
    }

    #[test]
    fn validate_requires_declared_through() {
        let mut registry = SchemaRegistry::new();
        registry.register(
            EntityDef::builder("Library")
                .has_many("books", AssocOpts::new().through("shelves"))
                .build()
                .unwrap(),
        );
        assert!(matches!(
            registry.validate(),
            Err(CoreError::Configuration { .. })
        ));
    }
}
