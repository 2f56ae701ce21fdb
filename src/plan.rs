use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::schema::{Container, EntityModel, Property};

/// Caller-supplied set of dotted field paths to materialize. An empty spec
/// means "no projection constraint, decode every present field". A path may
/// end in a single `*` segment to cover every sibling at that level.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionSpec {
    paths: BTreeSet<String>,
}

impl InclusionSpec {
    pub fn new() -> Self {
        InclusionSpec::default()
    }

    pub fn include(mut self, path: impl Into<String>) -> Self {
        self.paths.insert(path.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    /// True when some requested path descends below `path`.
    pub fn any_below(&self, path: &str) -> bool {
        let prefix = format!("{}.", path);
        self.paths.iter().any(|p| p.starts_with(&prefix))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for InclusionSpec {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        InclusionSpec {
            paths: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// The sibling names to materialize at one level. Members may be dotted
/// (a store-side projection of a nested field) or the literal `*`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldSet {
    names: BTreeSet<String>,
}

impl FieldSet {
    pub fn new() -> Self {
        FieldSet::default()
    }

    pub fn insert(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Whether a sibling field named `name` is covered: an exact member, the
    /// `*` catch-all, or a dotted member rooted at `name`.
    pub fn includes(&self, name: &str) -> bool {
        if self.names.contains(name) || self.names.contains("*") {
            return true;
        }
        let prefix = format!("{}.", name);
        self.names.iter().any(|n| n.starts_with(&prefix))
    }

    pub fn union(&mut self, other: &FieldSet) {
        for name in &other.names {
            self.names.insert(name.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for FieldSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        FieldSet {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Resolved projection: dotted path prefix to the field subset required at
/// that level. Built once per (root type, inclusion spec) pair, read-only
/// afterward, safe to share across decode sessions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionPlan {
    entries: BTreeMap<String, FieldSet>,
}

impl ProjectionPlan {
    /// No projection constraint at any path.
    pub fn unrestricted() -> Self {
        ProjectionPlan::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, path: &str) -> Option<&FieldSet> {
        self.entries.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldSet)> {
        self.entries.iter().map(|(p, s)| (p.as_str(), s))
    }

    fn merge(&mut self, path: &str, set: FieldSet) {
        if set.is_empty() {
            return;
        }
        self.entries.entry(path.to_string()).or_default().union(&set);
    }
}

/// Expand an inclusion spec against a type's declared structure into the
/// per-path field subsets the decoder (and the store query issuing the root
/// fetch) must use. Requested segments that match no declared field are
/// dropped silently. Resolving the same inputs twice yields equal plans.
pub fn resolve_projection_plan<M: EntityModel>(
    model: &M,
    ty: &str,
    spec: &InclusionSpec,
) -> ProjectionPlan {
    let mut plan = ProjectionPlan::default();
    if !spec.is_empty() {
        resolve_entity(model, ty, spec, "", "", &mut plan);
    }
    plan
}

fn join(context: &str, local: &str) -> String {
    if context.is_empty() {
        local.to_string()
    } else {
        format!("{}.{}", context, local)
    }
}

/// One level of resolution. `context` is the dotted path of the enclosing
/// document (empty at the root, extended across reference boundaries and map
/// keys); `prefix` carries the local names of enclosing inline entities, so
/// their nested fields are recorded as dotted members of the same entry.
fn resolve_entity<M: EntityModel>(
    model: &M,
    ty: &str,
    spec: &InclusionSpec,
    prefix: &str,
    context: &str,
    plan: &mut ProjectionPlan,
) {
    let Some(properties) = model.properties(ty) else {
        return;
    };
    let mut entry = FieldSet::new();
    for property in properties {
        let local = format!("{}{}", prefix, property.name());
        let global = join(context, &local);
        if spec.contains(&global) {
            entry.insert(local.clone());
        }
        if let Some(inner) = property.entity_type() {
            if spec.any_below(&global) {
                let nested = format!("{}.", property.name());
                resolve_entity(model, inner, spec, &nested, context, plan);
            }
        }
    }
    if let Some(associations) = model.associations(ty) {
        for association in associations {
            let local = format!("{}{}", prefix, association.name());
            let global = join(context, &local);
            if association.container() == Container::Map {
                resolve_map(model, association, spec, &local, &global, &mut entry, plan);
            } else if spec.contains(&global) || spec.any_below(&global) {
                entry.insert(local.clone());
                if spec.any_below(&global) {
                    if let Some(inner) = association.entity_type() {
                        resolve_entity(model, inner, spec, "", &global, plan);
                    }
                }
            }
        }
    }
    plan.merge(context, entry);
}

/// Map associations project per key: a concrete key or the `*` catch-all is
/// recorded in the entry at the map's own path, and deeper paths under a key
/// are resolved with that key as the new context.
fn resolve_map<M: EntityModel>(
    model: &M,
    association: &Property,
    spec: &InclusionSpec,
    local: &str,
    global: &str,
    entry: &mut FieldSet,
    plan: &mut ProjectionPlan,
) {
    let whole = spec.contains(global) || spec.contains(&format!("{}.*", global));
    let prefix = format!("{}.", global);
    let mut keys = FieldSet::new();
    let mut direct = Vec::new();
    let mut deeper = false;
    for requested in spec.iter() {
        let Some(rest) = requested.strip_prefix(&prefix) else {
            continue;
        };
        match rest.split_once('.') {
            None => {
                keys.insert(rest);
                if rest != "*" {
                    direct.push(format!("{}.{}", local, rest));
                }
            }
            Some((key, _)) => {
                keys.insert(key);
                deeper = true;
            }
        }
    }
    if whole || (direct.is_empty() && deeper) {
        entry.insert(local);
    }
    for name in direct {
        entry.insert(name);
    }
    for key in keys.iter() {
        let key_context = format!("{}.{}", global, key);
        if spec.any_below(&key_context) {
            if let Some(inner) = association.entity_type() {
                resolve_entity(model, inner, spec, "", &key_context, plan);
            }
        }
    }
    plan.merge(global, keys);
}
