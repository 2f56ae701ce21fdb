use crate::value::Value;

/// One decoded field value as handed to an [`InstanceBuilder`]. Nested
/// entities appear as builder handles rather than inline trees, so a cyclic
/// reference to a not-yet-fully-populated instance is safe to hand out.
#[derive(Clone, Debug, PartialEq)]
pub enum Materialized<H> {
    /// A decoded scalar or untyped document/array tree.
    Scalar(Value),
    /// A built (possibly still being populated) entity instance.
    Instance(H),
    /// A reference whose target document was not found. An absence, not an
    /// error; callers apply their own requiredness policy.
    Missing,
    /// Elements of a collection-typed field, in on-wire order.
    Array(Vec<Materialized<H>>),
    /// Entries of a map-typed field, in on-wire order.
    Map(Vec<(String, Materialized<H>)>),
}

/// Builds typed instances from decoded fields. The decoder creates a
/// skeleton handle first, then fills it field by field, so the handle can
/// be recorded in the reference cache (and observed by cycles) before the
/// instance is complete.
pub trait InstanceBuilder {
    type Handle: Clone;

    /// Create an empty skeleton for an instance of `ty`.
    fn begin(&mut self, ty: &str) -> Self::Handle;

    /// Set one decoded field on a skeleton. Called once per projected field,
    /// in on-wire order.
    fn set(&mut self, handle: &Self::Handle, field: &str, value: Materialized<Self::Handle>);

    /// All fields of this instance have been delivered.
    fn finish(&mut self, handle: &Self::Handle);
}

/// Stable index into an [`ObjectArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjHandle(usize);

/// One built instance in an arena.
#[derive(Debug)]
pub struct ObjectNode {
    ty: String,
    fields: Vec<(String, Materialized<ObjHandle>)>,
    complete: bool,
}

impl ObjectNode {
    pub fn ty(&self) -> &str {
        &self.ty
    }

    pub fn fields(&self) -> &[(String, Materialized<ObjHandle>)] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Materialized<ObjHandle>> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// False only while the decoder is still delivering fields, which a
    /// cycle can observe.
    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

/// Arena-backed [`InstanceBuilder`]: instances live behind index handles,
/// which makes the create-skeleton-then-fill discipline trivial. Suitable
/// for tests and for embedders that post-process the decoded graph.
#[derive(Debug, Default)]
pub struct ObjectArena {
    nodes: Vec<ObjectNode>,
}

impl ObjectArena {
    pub fn new() -> Self {
        ObjectArena::default()
    }

    pub fn get(&self, handle: ObjHandle) -> Option<&ObjectNode> {
        self.nodes.get(handle.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl InstanceBuilder for ObjectArena {
    type Handle = ObjHandle;

    fn begin(&mut self, ty: &str) -> ObjHandle {
        self.nodes.push(ObjectNode {
            ty: ty.to_string(),
            fields: Vec::new(),
            complete: false,
        });
        ObjHandle(self.nodes.len() - 1)
    }

    fn set(&mut self, handle: &ObjHandle, field: &str, value: Materialized<ObjHandle>) {
        if let Some(node) = self.nodes.get_mut(handle.0) {
            node.fields.push((field.to_string(), value));
        }
    }

    fn finish(&mut self, handle: &ObjHandle) {
        if let Some(node) = self.nodes.get_mut(handle.0) {
            node.complete = true;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn skeleton_then_fill() {
        let mut arena = ObjectArena::new();
        let a = arena.begin("Product");
        assert!(!arena.get(a).unwrap().is_complete());
        arena.set(&a, "name", Materialized::Scalar(Value::from("Milk")));
        let b = arena.begin("Supplier");
        arena.set(&a, "supplier", Materialized::Instance(b));
        arena.finish(&b);
        arena.finish(&a);
        let node = arena.get(a).unwrap();
        assert_eq!(node.ty(), "Product");
        assert_eq!(
            node.field("name"),
            Some(&Materialized::Scalar(Value::from("Milk")))
        );
        assert_eq!(node.field("supplier"), Some(&Materialized::Instance(b)));
        assert!(node.is_complete());
    }
}
