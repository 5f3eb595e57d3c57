//! Storage-key naming and association-name inflection.
//!
//! Key layouts are fixed and deterministic; every piece of engine state
//! lives under one of the four shapes below.

use convert_case::{Case, Casing};

/// Key of the field map holding one record's attributes.
pub fn record_key(type_name: &str, id: i64) -> String {
    format!("{type_name}_{id}")
}

/// Key of the set of all ids belonging to a type.
pub fn type_set_key(type_name: &str) -> String {
    format!("_all_{type_name}_ids")
}

/// Key of the set of related ids for one (owner, association) pair.
pub fn assoc_set_key(type_name: &str, owner_id: i64, assoc_name: &str) -> String {
    format!("_list_{type_name}_{owner_id}_{assoc_name}")
}

/// Key of the per-type id counter.
///
/// The counter key is the bare type name.
pub fn counter_key(type_name: &str) -> String {
    type_name.to_string()
}

/// Reduces a plural association name to its singular form.
///
/// Handles the regular English plurals the engine relies on
/// (`pages` -> `page`, `stories` -> `story`); irregular nouns should use
/// an explicit target type instead.
pub fn singularize(name: &str) -> String {
    if let Some(stem) = name.strip_suffix("ies") {
        format!("{stem}y")
    } else if name.ends_with("ss") {
        name.to_string()
    } else if let Some(stem) = name.strip_suffix('s') {
        stem.to_string()
    } else {
        name.to_string()
    }
}

/// Infers an entity type name from an association name.
///
/// The association name is singularized and Pascal-cased:
/// `chapters` -> `Chapter`, `cover_image` -> `CoverImage`.
pub fn infer_type_name(assoc_name: &str) -> String {
    singularize(assoc_name).to_case(Case::Pascal)
}

/// Derives the snake_case association-name stem for a type name.
///
/// Used by inverse notification to match a destroyed record against its
/// parent's collections: `CoverImage` -> `cover_image`.
pub fn underscore(type_name: &str) -> String {
    type_name.to_case(Case::Snake)
}
