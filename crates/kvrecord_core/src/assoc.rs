//! Association resolution and membership over key-value sets.
//!
//! Every graph edge is backed by plain set operations: a `has_many` or
//! `has_one` owner keeps member ids in its association-set key, while a
//! `belongs_to` side reads its `{name}_id` attribute. Resolution is
//! lenient throughout - members that no longer exist are dropped, not
//! errors.

use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::keys;
use crate::repo::Repository;
use crate::schema::{AssocDecl, AssocKind, Dependent, Target};
use tracing::warn;

impl Repository {
    pub(crate) fn assoc_decl(&self, name: &str) -> CoreResult<AssocDecl> {
        self.def()
            .association(name)
            .cloned()
            .ok_or_else(|| {
                CoreError::configuration(format!(
                    "{} has no association '{}'",
                    self.def().name(),
                    name
                ))
            })
    }

    /// Resolves the repository an association's members live in.
    ///
    /// Polymorphic associations read the concrete type name from the
    /// owner's `{name}_type` attribute at call time; an unknown or empty
    /// type name is a configuration error.
    fn target_repo(&self, owner: &Entity, decl: &AssocDecl) -> CoreResult<Repository> {
        let type_name = match &decl.target {
            Target::Polymorphic => {
                let attr = format!("{}_type", decl.name);
                match owner.get(&attr).as_str() {
                    Some(name) if !name.is_empty() => name.to_string(),
                    _ => {
                        return Err(CoreError::configuration(format!(
                            "{}.{}: polymorphic association has no '{}' value",
                            self.def().name(),
                            decl.name,
                            attr
                        )))
                    }
                }
            }
            Target::Explicit(name) => name.clone(),
            Target::Inferred => keys::infer_type_name(&decl.name),
        };
        self.repo_for(&type_name)
    }

    fn assoc_key(&self, owner: &Entity, assoc_name: &str) -> String {
        keys::assoc_set_key(self.def().name(), owner.id(), assoc_name)
    }

    /// Resolves the current members of any association, without
    /// memoization: zero or one entity for `belongs_to`/`has_one`, all
    /// live members for `has_many`, the flattened composition for a
    /// through-association.
    fn resolve_all(&self, owner: &Entity, decl: &AssocDecl) -> CoreResult<Vec<Entity>> {
        if let Some(through_name) = &decl.through {
            return self.resolve_through(owner, decl, through_name);
        }
        match decl.kind {
            AssocKind::BelongsTo => {
                let fk = owner.get(&format!("{}_id", decl.name));
                let id = fk.as_int().unwrap_or(0);
                if id == 0 {
                    return Ok(Vec::new());
                }
                let target = self.target_repo(owner, decl)?;
                Ok(target.try_find(id)?.into_iter().collect())
            }
            AssocKind::HasOne => {
                let members = self.store().smembers(&self.assoc_key(owner, &decl.name))?;
                let Some(first) = members.first() else {
                    return Ok(Vec::new());
                };
                let id = first.parse::<i64>().unwrap_or(0);
                if id == 0 {
                    return Ok(Vec::new());
                }
                let target = self.target_repo(owner, decl)?;
                Ok(target.try_find(id)?.into_iter().collect())
            }
            AssocKind::HasMany => {
                let members = self.store().smembers(&self.assoc_key(owner, &decl.name))?;
                let ids: Vec<i64> = members.iter().filter_map(|m| m.parse().ok()).collect();
                let target = self.target_repo(owner, decl)?;
                target.find_existing(&ids)
            }
        }
    }

    fn resolve_through(
        &self,
        owner: &Entity,
        decl: &AssocDecl,
        through_name: &str,
    ) -> CoreResult<Vec<Entity>> {
        let through_decl = self.assoc_decl(through_name)?;
        let intermediates = self.resolve_all(owner, &through_decl)?;
        let terminal = keys::singularize(&decl.name);

        let mut members = Vec::new();
        for intermediate in intermediates {
            let repo = self.repo_for(intermediate.type_name())?;
            let terminal_decl = repo.def().association(&terminal).cloned().ok_or_else(|| {
                CoreError::configuration(format!(
                    "{}.{}: intermediate type {} has no association '{}'",
                    self.def().name(),
                    decl.name,
                    intermediate.type_name(),
                    terminal
                ))
            })?;
            members.extend(repo.resolve_all(&intermediate, &terminal_decl)?);
        }
        Ok(members)
    }

    /// Enumerates the entities of a `has_many` association (through
    /// compositions included), dropping members that no longer exist.
    ///
    /// # Errors
    ///
    /// Naming anything other than a `has_many` association is a
    /// configuration error.
    pub fn related(&self, owner: &Entity, assoc_name: &str) -> CoreResult<Vec<Entity>> {
        let decl = self.assoc_decl(assoc_name)?;
        if decl.kind != AssocKind::HasMany {
            return Err(CoreError::configuration(format!(
                "{}.{} is not a has_many association",
                self.def().name(),
                assoc_name
            )));
        }
        self.resolve_all(owner, &decl)
    }

    /// Lists a `has_many` association's member ids without resolving
    /// entities. A through-association resolves its composition and maps
    /// the ids.
    pub fn member_ids(&self, owner: &Entity, assoc_name: &str) -> CoreResult<Vec<i64>> {
        let decl = self.assoc_decl(assoc_name)?;
        if decl.kind != AssocKind::HasMany {
            return Err(CoreError::configuration(format!(
                "{}.{} is not a has_many association",
                self.def().name(),
                assoc_name
            )));
        }
        if decl.is_through() {
            return Ok(self
                .resolve_all(owner, &decl)?
                .iter()
                .map(Entity::id)
                .collect());
        }
        let members = self.store().smembers(&self.assoc_key(owner, assoc_name))?;
        Ok(members.iter().filter_map(|m| m.parse().ok()).collect())
    }

    /// Inserts a member id into a `has_many` association set.
    ///
    /// Set semantics: adding twice is the same as adding once.
    ///
    /// # Errors
    ///
    /// Mutating a through-association is a configuration error, never a
    /// silent no-op; linking an unsaved member is a precondition error.
    pub fn add_member(&self, owner: &Entity, assoc_name: &str, member: &Entity) -> CoreResult<()> {
        let decl = self.mutable_has_many(assoc_name, "add")?;
        self.check_member_id(member)?;
        self.store()
            .sadd(&self.assoc_key(owner, &decl.name), &member.id().to_string())?;
        Ok(())
    }

    /// Removes a member id from a `has_many` association set.
    ///
    /// # Errors
    ///
    /// Mutating a through-association is a configuration error.
    pub fn remove_member(
        &self,
        owner: &Entity,
        assoc_name: &str,
        member: &Entity,
    ) -> CoreResult<()> {
        let decl = self.mutable_has_many(assoc_name, "remove")?;
        self.store()
            .srem(&self.assoc_key(owner, &decl.name), &member.id().to_string())?;
        Ok(())
    }

    fn mutable_has_many(&self, assoc_name: &str, verb: &str) -> CoreResult<AssocDecl> {
        let decl = self.assoc_decl(assoc_name)?;
        if decl.kind != AssocKind::HasMany {
            return Err(CoreError::configuration(format!(
                "{}.{} is not a has_many association",
                self.def().name(),
                assoc_name
            )));
        }
        if decl.is_through() {
            return Err(CoreError::configuration(format!(
                "{}.{}: cannot {} members via a through association",
                self.def().name(),
                assoc_name,
                verb
            )));
        }
        Ok(decl)
    }

    fn check_member_id(&self, member: &Entity) -> CoreResult<()> {
        if member.has_id() {
            Ok(())
        } else {
            Err(CoreError::precondition(format!(
                "cannot link unsaved {} into an association",
                member.type_name()
            )))
        }
    }

    /// Resolves a `belongs_to` reference, memoized on the owner.
    ///
    /// The memo is invalidated whenever `{name}_id` is reassigned. A
    /// missing target resolves to `None`, not an error.
    pub fn belongs_to(&self, owner: &mut Entity, assoc_name: &str) -> CoreResult<Option<Entity>> {
        let decl = self.assoc_decl(assoc_name)?;
        if decl.kind != AssocKind::BelongsTo {
            return Err(CoreError::configuration(format!(
                "{}.{} is not a belongs_to association",
                self.def().name(),
                assoc_name
            )));
        }

        if let Some(cached) = owner.cached_ref(assoc_name) {
            return Ok(cached.as_deref().cloned());
        }

        let resolved = self.resolve_all(owner, &decl)?.into_iter().next();
        owner.set_cached_ref(assoc_name, resolved.clone());
        Ok(resolved)
    }

    /// Reads a `has_one` association: the only member lenient-resolved,
    /// or `None` when the set is empty.
    pub fn has_one(&self, owner: &Entity, assoc_name: &str) -> CoreResult<Option<Entity>> {
        let decl = self.assoc_decl(assoc_name)?;
        if decl.kind != AssocKind::HasOne {
            return Err(CoreError::configuration(format!(
                "{}.{} is not a has_one association",
                self.def().name(),
                assoc_name
            )));
        }
        Ok(self.resolve_all(owner, &decl)?.into_iter().next())
    }

    /// Replaces a `has_one` association's member: the set is cleared and
    /// exactly the new member's id inserted.
    pub fn set_has_one(&self, owner: &Entity, assoc_name: &str, member: &Entity) -> CoreResult<()> {
        let decl = self.assoc_decl(assoc_name)?;
        if decl.kind != AssocKind::HasOne {
            return Err(CoreError::configuration(format!(
                "{}.{} is not a has_one association",
                self.def().name(),
                assoc_name
            )));
        }
        self.check_member_id(member)?;
        let key = self.assoc_key(owner, &decl.name);
        self.store().del(&key)?;
        self.store().sadd(&key, &member.id().to_string())?;
        Ok(())
    }

    /// Destroys dependent members and removes their association-set keys.
    ///
    /// Only associations declared with the destroy policy are touched;
    /// the rest keep their sets (their entries may orphan - accepted
    /// behavior).
    pub(crate) fn destroy_dependents(&self, entity: &Entity) -> CoreResult<()> {
        for decl in self.def().associations() {
            if decl.dependent != Dependent::Destroy {
                continue;
            }
            let members = self.resolve_all(entity, decl)?;
            for mut member in members {
                let repo = self.repo_for(member.type_name())?;
                repo.destroy(&mut member)?;
            }
            if !decl.is_through() {
                self.store().del(&self.assoc_key(entity, &decl.name))?;
            }
        }
        Ok(())
    }

    /// Tells every resolved relative that this instance is gone by
    /// removing its id from the relative's matching collection.
    ///
    /// A relative "matches" when its type declares a `has_many` whose
    /// singular name equals this type's snake_case name. Resolution
    /// failures are logged and do not stop the remaining associations.
    pub(crate) fn notify_parents(&self, entity: &Entity) -> CoreResult<()> {
        let stem = keys::underscore(self.def().name());
        for decl in self.def().associations() {
            if decl.is_through() {
                continue;
            }
            let relatives = match self.resolve_all(entity, decl) {
                Ok(resolved) => resolved,
                Err(err) => {
                    warn!(
                        type_name = self.def().name(),
                        association = decl.name.as_str(),
                        error = %err,
                        "skipping inverse notification; association did not resolve"
                    );
                    continue;
                }
            };

            for relative in relatives {
                let Some(collection) = relative
                    .def()
                    .associations()
                    .iter()
                    .find(|a| {
                        a.kind == AssocKind::HasMany
                            && !a.is_through()
                            && keys::singularize(&a.name) == stem
                    })
                    .cloned()
                else {
                    continue;
                };

                self.store().srem(
                    &keys::assoc_set_key(relative.type_name(), relative.id(), &collection.name),
                    &entity.id().to_string(),
                )?;
            }
        }
        Ok(())
    }
}
