//! Selective wire marshalling.
//!
//! Produces a JSON representation of an entity honoring the type's
//! visibility lists. Sendable names that are associations are resolved
//! and nested under an `associations` object; everything else is emitted
//! top-level, with datetimes as integer epoch seconds.

use crate::entity::Entity;
use crate::error::CoreResult;
use crate::repo::Repository;
use crate::schema::AssocKind;
use crate::value::Value;
use serde_json::{json, Map};

fn json_value(value: Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Int(n) => json!(n),
        Value::Float(f) => serde_json::Value::from(f),
        Value::Str(s) | Value::Symbol(s) => json!(s),
        Value::Bool(b) => json!(b),
        Value::DateTime(t) => json!(t.unix_timestamp()),
    }
}

impl Repository {
    /// Computes the sendable name list for an instance.
    ///
    /// Base set: the synthetic `classname` field, every declared
    /// persistent attribute, and the type's forcesendable names, minus
    /// the unsendable names (unsendable wins). Call-scoped forcesends
    /// are appended after the subtraction.
    fn sendable_names(&self, entity: &Entity) -> Vec<String> {
        let def = self.def();
        let mut names: Vec<String> = Vec::new();
        let mut push = |name: &str, names: &mut Vec<String>| {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        };

        push("classname", &mut names);
        for decl in def.attributes() {
            push(&decl.name, &mut names);
        }
        for name in def.forcesendable() {
            push(name, &mut names);
        }
        names.retain(|name| !def.unsendable().contains(name));
        for name in entity.temp_forcesendable() {
            push(name, &mut names);
        }
        names
    }

    /// Marshals an instance into its wire representation.
    ///
    /// Association members are marshalled recursively through their own
    /// repositories; a `belongs_to`/`has_one` that resolves to nothing
    /// emits JSON null.
    pub fn to_wire(&self, entity: &Entity) -> CoreResult<serde_json::Value> {
        let def = self.def();
        let mut top = Map::new();
        let mut associations = Map::new();

        for name in self.sendable_names(entity) {
            if let Some(decl) = def.association(&name) {
                let resolved = self.resolve_for_wire(entity, &name)?;
                let value = match decl.kind {
                    AssocKind::HasMany => serde_json::Value::Array(resolved),
                    AssocKind::HasOne | AssocKind::BelongsTo => {
                        resolved.into_iter().next().unwrap_or(serde_json::Value::Null)
                    }
                };
                associations.insert(name, value);
            } else if name == "classname" {
                top.insert(name, json!(def.name()));
            } else {
                top.insert(name.clone(), json_value(entity.get(&name)));
            }
        }

        if !associations.is_empty() {
            top.insert(
                "associations".to_string(),
                serde_json::Value::Object(associations),
            );
        }
        Ok(serde_json::Value::Object(top))
    }

    fn resolve_for_wire(
        &self,
        entity: &Entity,
        assoc_name: &str,
    ) -> CoreResult<Vec<serde_json::Value>> {
        let decl = self.assoc_decl(assoc_name)?;
        let members = match decl.kind {
            AssocKind::HasMany => self.related(entity, assoc_name)?,
            AssocKind::HasOne => self.has_one(entity, assoc_name)?.into_iter().collect(),
            AssocKind::BelongsTo => {
                // Resolve without touching the owner's memo; marshalling
                // takes the instance by shared reference.
                let mut scratch = entity.clone();
                self.belongs_to(&mut scratch, assoc_name)?.into_iter().collect()
            }
        };

        let mut wired = Vec::with_capacity(members.len());
        for member in members {
            let repo = self.repo_for(member.type_name())?;
            wired.push(repo.to_wire(&member)?);
        }
        Ok(wired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::schema::{EntityDef, SchemaRegistry};
    use crate::value::AttrKind;
    use kvrecord_store::{KvStore, MemoryStore};
    use std::sync::Arc;

    fn repo() -> Repository {
        let mut registry = SchemaRegistry::new();
        registry.register(
            EntityDef::builder("Account")
                .attribute("email", AttrKind::String)
                .attribute("secret", AttrKind::String)
                .unsendable("secret")
                .forcesendable("avatar")
                .build()
                .unwrap(),
        );
        let registry = Arc::new(registry);
        let def = registry.get("Account").unwrap();
        Repository::new(
            def,
            Arc::new(MemoryStore::new()) as Arc<dyn KvStore>,
            registry,
            Config::default(),
        )
    }

    #[test]
    fn sendable_names_start_with_classname() {
        let repo = repo();
        let account = repo.build(Vec::<(String, Value)>::new()).unwrap();
        let names = repo.sendable_names(&account);
        assert_eq!(names[0], "classname");
        assert!(names.contains(&"email".to_string()));
        assert!(names.contains(&"avatar".to_string()));
        assert!(!names.contains(&"secret".to_string()));
    }

    #[test]
    fn temp_forcesend_survives_the_unsendable_subtraction() {
        let repo = repo();
        let mut account = repo.build(Vec::<(String, Value)>::new()).unwrap();
        account.temporarily_forcesend("secret");
        let names = repo.sendable_names(&account);
        assert!(names.contains(&"secret".to_string()));
    }

    #[test]
    fn json_values_keep_their_shapes() {
        assert_eq!(json_value(Value::Null), serde_json::Value::Null);
        assert_eq!(json_value(Value::Int(4)), json!(4));
        assert_eq!(json_value(Value::from("x")), json!("x"));
        assert_eq!(json_value(Value::Bool(false)), json!(false));
    }
}
