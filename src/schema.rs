use std::collections::HashMap;

/// Container shape of a persistent field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Container {
    /// One value.
    Singular,
    /// Ordered list; on the wire an array-document with positional names.
    Collection,
    /// String-keyed map; on the wire a document whose field names are the
    /// map keys.
    Map,
}

/// What kind of value a field holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValueKind {
    /// A scalar the wire format encodes directly.
    Simple,
    /// Another declared entity type, embedded or referenced.
    Entity(String),
}

/// Persistence descriptor for one declared field of an entity type: the
/// on-wire name, container shape, value kind, whether the value lives in a
/// separate document (a reference), and where such referents default to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Property {
    name: String,
    container: Container,
    value: ValueKind,
    reference: bool,
    origin: Option<String>,
    id: bool,
}

impl Property {
    /// A plain scalar field.
    pub fn simple(name: impl Into<String>) -> Self {
        Property {
            name: name.into(),
            container: Container::Singular,
            value: ValueKind::Simple,
            reference: false,
            origin: None,
            id: false,
        }
    }

    /// The identifier field of the type.
    pub fn id(name: impl Into<String>) -> Self {
        Property {
            id: true,
            ..Property::simple(name)
        }
    }

    /// An entity value stored inline in the enclosing document.
    pub fn embedded(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Property {
            name: name.into(),
            container: Container::Singular,
            value: ValueKind::Entity(ty.into()),
            reference: false,
            origin: None,
            id: false,
        }
    }

    /// An entity value stored as a separate document and referenced by id.
    pub fn reference(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Property {
            reference: true,
            ..Property::embedded(name, ty)
        }
    }

    pub fn collection(mut self) -> Self {
        self.container = Container::Collection;
        self
    }

    pub fn map(mut self) -> Self {
        self.container = Container::Map;
        self
    }

    /// Default origin store for referents of this field, overridden by an
    /// explicit origin on the wire.
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn container(&self) -> Container {
        self.container
    }

    pub fn value_kind(&self) -> &ValueKind {
        &self.value
    }

    /// The declared entity type of the value, if it has one.
    pub fn entity_type(&self) -> Option<&str> {
        match &self.value {
            ValueKind::Entity(ty) => Some(ty),
            ValueKind::Simple => None,
        }
    }

    pub fn is_reference(&self) -> bool {
        self.reference
    }

    pub fn is_id(&self) -> bool {
        self.id
    }

    pub fn default_origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }
}

/// Introspection contract over declared entity types. Two ordered slices per
/// type: the inline properties, then the reference associations.
pub trait EntityModel {
    /// Ordered non-reference fields of `ty`, or `None` for an undeclared
    /// type.
    fn properties(&self, ty: &str) -> Option<&[Property]>;

    /// Ordered reference fields of `ty`, or `None` for an undeclared type.
    fn associations(&self, ty: &str) -> Option<&[Property]>;

    /// Look a field up by its on-wire name across both lists.
    fn find(&self, ty: &str, field: &str) -> Option<&Property> {
        self.properties(ty)
            .and_then(|props| props.iter().find(|p| p.name() == field))
            .or_else(|| {
                self.associations(ty)
                    .and_then(|assocs| assocs.iter().find(|p| p.name() == field))
            })
    }
}

impl<M: EntityModel + ?Sized> EntityModel for &M {
    fn properties(&self, ty: &str) -> Option<&[Property]> {
        (**self).properties(ty)
    }

    fn associations(&self, ty: &str) -> Option<&[Property]> {
        (**self).associations(ty)
    }
}

#[derive(Default)]
struct TypeEntry {
    properties: Vec<Property>,
    associations: Vec<Property>,
}

/// Map-backed [`EntityModel`] for embedders that declare their types by
/// hand.
#[derive(Default)]
pub struct ModelRegistry {
    types: HashMap<String, TypeEntry>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        ModelRegistry::default()
    }

    /// Declare a type. Fields keep their given order; reference fields are
    /// split off into the association list.
    pub fn define(&mut self, ty: impl Into<String>, fields: Vec<Property>) -> &mut Self {
        let mut entry = TypeEntry::default();
        for field in fields {
            if field.is_reference() {
                entry.associations.push(field);
            } else {
                entry.properties.push(field);
            }
        }
        self.types.insert(ty.into(), entry);
        self
    }
}

impl EntityModel for ModelRegistry {
    fn properties(&self, ty: &str) -> Option<&[Property]> {
        self.types.get(ty).map(|e| e.properties.as_slice())
    }

    fn associations(&self, ty: &str) -> Option<&[Property]> {
        self.types.get(ty).map(|e| e.associations.as_slice())
    }
}
