//! The object-graph builder: walks one document's token stream against a
//! declared entity type, materializing only the projected fields and
//! resolving references through the per-session cache.

use tracing::{debug, trace};

use crate::cache::{RefKey, ReferenceCache};
use crate::document::{self, RawDocument};
use crate::error::{Error, Result};
use crate::instance::{InstanceBuilder, Materialized};
use crate::path::PathStack;
use crate::plan::{resolve_projection_plan, InclusionSpec, ProjectionPlan};
use crate::schema::{Container, EntityModel, Property};
use crate::store::StoreClient;
use crate::token::{Scalar, Token, TokenStream};
use crate::value::{DocumentRef, RefId, Value};

/// Reference-aware decoder over an entity model and a store client.
///
/// A `Decoder` is cheap state (no connection, no cache) and may be shared
/// freely; every [`decode`](Decoder::decode) call owns its own token
/// stream, path stack, and reference cache, so concurrent calls never
/// contend.
pub struct Decoder<M, S> {
    model: M,
    store: S,
    default_origin: String,
}

impl<M: EntityModel, S: StoreClient> Decoder<M, S> {
    /// `default_origin` scopes references that carry no explicit origin and
    /// whose field declares none.
    pub fn new(model: M, store: S, default_origin: impl Into<String>) -> Self {
        Decoder {
            model,
            store,
            default_origin: default_origin.into(),
        }
    }

    /// Expand an inclusion spec for `ty`. Exposed so the caller issuing the
    /// root store query can ask the store for exactly the subset this
    /// decoder will consume.
    pub fn plan(&self, ty: &str, spec: &InclusionSpec) -> ProjectionPlan {
        resolve_projection_plan(&self.model, ty, spec)
    }

    /// Decode one document of type `ty` into the builder, returning the
    /// root instance handle. `spec = None` materializes every present
    /// field.
    pub fn decode<B: InstanceBuilder>(
        &self,
        builder: &mut B,
        ty: &str,
        raw: &RawDocument,
        spec: Option<&InclusionSpec>,
    ) -> Result<B::Handle> {
        let plan = match spec {
            Some(spec) => self.plan(ty, spec),
            None => ProjectionPlan::unrestricted(),
        };
        self.decode_with_plan(builder, ty, raw, &plan)
    }

    /// Like [`decode`](Decoder::decode), with a caller-held plan. Plans are
    /// read-only after construction and may be reused across calls for the
    /// same (type, spec) pair.
    pub fn decode_with_plan<B: InstanceBuilder>(
        &self,
        builder: &mut B,
        ty: &str,
        raw: &RawDocument,
        plan: &ProjectionPlan,
    ) -> Result<B::Handle> {
        let mut session = Session {
            model: &self.model,
            store: &self.store,
            plan,
            path: PathStack::new(),
            cache: ReferenceCache::new(),
            builder,
        };
        let mut stream = raw.stream();
        match stream.next()? {
            Some(Token::DocumentStart) => (),
            _ => return Err(Error::malformed("", "missing document start")),
        }
        session.read_entity(&mut stream, ty, &self.default_origin, None)
    }
}

/// One decode call's mutable state. Created per call, dropped at its end.
struct Session<'a, M, S, B: InstanceBuilder> {
    model: &'a M,
    store: &'a S,
    plan: &'a ProjectionPlan,
    path: PathStack,
    cache: ReferenceCache<B::Handle>,
    builder: &'a mut B,
}

impl<M: EntityModel, S: StoreClient, B: InstanceBuilder> Session<'_, M, S, B> {
    /// Read one entity document body (the `DocumentStart` is already
    /// consumed). `key` is the reference identity to record before
    /// population, when this entity is a fetched referent.
    fn read_entity(
        &mut self,
        stream: &mut TokenStream<&[u8]>,
        ty: &str,
        origin: &str,
        key: Option<RefKey>,
    ) -> Result<B::Handle> {
        let handle = self.builder.begin(ty);
        if let Some(key) = key {
            self.cache.record(key, handle.clone());
        }
        let fields = self.path.effective_fields(self.plan);
        loop {
            match stream.next()? {
                Some(Token::FieldName(name)) => {
                    let Some(property) = self.model.find(ty, &name) else {
                        trace!(field = %name, "skipping undeclared field");
                        skip_value(stream)?;
                        continue;
                    };
                    if !property.is_id() {
                        if let Some(set) = &fields {
                            if !set.includes(&name) {
                                trace!(field = %name, "skipping unprojected field");
                                skip_value(stream)?;
                                continue;
                            }
                        }
                    }
                    let value = self.read_property(stream, property, origin)?;
                    if property.is_id() {
                        if let Materialized::Scalar(ref scalar) = value {
                            if let Some(id) = RefId::from_value(scalar) {
                                // the entity's own identity resolves to it
                                self.cache.record(
                                    RefKey::new(ty, id, origin, fields.clone()),
                                    handle.clone(),
                                );
                            }
                        }
                    }
                    self.builder.set(&handle, &name, value);
                }
                Some(Token::DocumentEnd) => break,
                Some(tok) => {
                    return Err(Error::malformed(
                        stream.current_path(),
                        format!("unexpected token {:?} in document", tok),
                    ))
                }
                None => {
                    return Err(Error::malformed(
                        stream.current_path(),
                        "unexpected end of input",
                    ))
                }
            }
        }
        self.builder.finish(&handle);
        Ok(handle)
    }

    /// Read one declared field's value. Non-simple fields push their name
    /// onto the path for the duration of the read; plain scalars skip the
    /// push, since no projection decision can occur below them.
    fn read_property(
        &mut self,
        stream: &mut TokenStream<&[u8]>,
        property: &Property,
        origin: &str,
    ) -> Result<Materialized<B::Handle>> {
        let pushed = property.is_reference() || property.entity_type().is_some();
        if pushed {
            self.path.push(property.name());
        }
        let result = self.read_property_value(stream, property, origin, pushed);
        if pushed {
            self.path.pop();
        }
        result
    }

    fn read_property_value(
        &mut self,
        stream: &mut TokenStream<&[u8]>,
        property: &Property,
        origin: &str,
        pushed: bool,
    ) -> Result<Materialized<B::Handle>> {
        match property.container() {
            Container::Singular => {
                let tok = next_token(stream)?;
                self.read_member(stream, tok, property, origin)
            }
            Container::Collection => match next_token(stream)? {
                Token::Value(Scalar::Null) => Ok(Materialized::Scalar(Value::Null)),
                Token::ArrayStart => {
                    let mut items = Vec::new();
                    loop {
                        match next_token(stream)? {
                            Token::ArrayEnd => break,
                            tok => {
                                self.path.push("");
                                let item = self.read_member(stream, tok, property, origin);
                                self.path.pop();
                                items.push(item?);
                            }
                        }
                    }
                    Ok(Materialized::Array(items))
                }
                tok => Err(Error::malformed(
                    stream.current_path(),
                    format!("expected an array, got {:?}", tok),
                )),
            },
            Container::Map => match next_token(stream)? {
                Token::Value(Scalar::Null) => Ok(Materialized::Scalar(Value::Null)),
                Token::DocumentStart => {
                    // key filter only applies when the map's own name is on
                    // the path, which holds exactly when it was pushed
                    let keys = if pushed {
                        self.path.effective_fields(self.plan)
                    } else {
                        None
                    };
                    let mut entries = Vec::new();
                    loop {
                        match next_token(stream)? {
                            Token::FieldName(key) => {
                                if let Some(set) = &keys {
                                    if !set.includes(&key) {
                                        trace!(key = %key, "skipping unprojected map key");
                                        skip_value(stream)?;
                                        continue;
                                    }
                                }
                                self.path.push(key.clone());
                                let value = next_token(stream).and_then(|tok| {
                                    self.read_member(stream, tok, property, origin)
                                });
                                self.path.pop();
                                entries.push((key, value?));
                            }
                            Token::DocumentEnd => break,
                            tok => {
                                return Err(Error::malformed(
                                    stream.current_path(),
                                    format!("unexpected token {:?} in map", tok),
                                ))
                            }
                        }
                    }
                    Ok(Materialized::Map(entries))
                }
                tok => Err(Error::malformed(
                    stream.current_path(),
                    format!("expected a map document, got {:?}", tok),
                )),
            },
        }
    }

    /// Read one member value (a singular field, an array element, or a map
    /// entry) whose first token has already been consumed.
    fn read_member(
        &mut self,
        stream: &mut TokenStream<&[u8]>,
        token: Token,
        property: &Property,
        origin: &str,
    ) -> Result<Materialized<B::Handle>> {
        if property.is_reference() {
            return match token {
                Token::Value(Scalar::Null) => Ok(Materialized::Scalar(Value::Null)),
                Token::DocumentStart => {
                    let body = document::read_document_body(stream)?;
                    match document::collapse_reference(body) {
                        Value::Reference(dref) => self.resolve_reference(dref, property, origin),
                        _ => Err(Error::malformed(
                            stream.current_path(),
                            "expected a reference document",
                        )),
                    }
                }
                Token::Value(Scalar::DbPointer { namespace, id }) => {
                    let (pointer_origin, collection) = match namespace.split_once('.') {
                        Some((db, coll)) => (Some(db.to_string()), coll.to_string()),
                        None => (None, namespace),
                    };
                    let dref = DocumentRef {
                        collection,
                        id: RefId::ObjectId(id),
                        origin: pointer_origin,
                    };
                    self.resolve_reference(dref, property, origin)
                }
                tok => Err(Error::malformed(
                    stream.current_path(),
                    format!("expected a reference, got {:?}", tok),
                )),
            };
        }
        if let Some(inner) = property.entity_type() {
            return match token {
                Token::Value(Scalar::Null) => Ok(Materialized::Scalar(Value::Null)),
                Token::DocumentStart => {
                    let handle = self.read_entity(stream, inner, origin, None)?;
                    Ok(Materialized::Instance(handle))
                }
                tok => Err(Error::malformed(
                    stream.current_path(),
                    format!("expected an embedded document, got {:?}", tok),
                )),
            };
        }
        Ok(Materialized::Scalar(document::read_value_from(
            stream, token,
        )?))
    }

    /// Resolve one reference: cache lookup first, then a projected store
    /// fetch, recording the new instance's identity before its own fields
    /// (and references) are read.
    fn resolve_reference(
        &mut self,
        dref: DocumentRef,
        property: &Property,
        origin: &str,
    ) -> Result<Materialized<B::Handle>> {
        let Some(ty) = property.entity_type() else {
            return Ok(Materialized::Scalar(Value::Reference(dref)));
        };
        let fields = self.path.effective_fields(self.plan);
        let target_origin = dref
            .origin
            .clone()
            .or_else(|| property.default_origin().map(String::from))
            .unwrap_or_else(|| origin.to_string());
        let key = RefKey::new(ty, dref.id.clone(), target_origin.clone(), fields.clone());
        if let Some(handle) = self.cache.lookup(&key) {
            trace!(collection = %dref.collection, id = %dref.id, "reference cache hit");
            return Ok(Materialized::Instance(handle.clone()));
        }
        debug!(
            collection = %dref.collection,
            id = %dref.id,
            origin = %target_origin,
            "fetching referenced document"
        );
        let fetched = self
            .store
            .fetch_one(&target_origin, &dref.collection, &dref.id, fields.as_ref())
            .map_err(|source| Error::StoreFetch {
                path: self.path.current_path(),
                collection: dref.collection.clone(),
                id: dref.id.to_string(),
                source,
            })?;
        let Some(raw) = fetched else {
            debug!(collection = %dref.collection, id = %dref.id, "referenced document not found");
            return Ok(Materialized::Missing);
        };
        let mut stream = raw.stream();
        match stream.next()? {
            Some(Token::DocumentStart) => (),
            _ => {
                return Err(Error::malformed(
                    self.path.current_path(),
                    "missing document start",
                ))
            }
        }
        let handle = self.read_entity(&mut stream, ty, &target_origin, Some(key))?;
        Ok(Materialized::Instance(handle))
    }
}

fn next_token(stream: &mut TokenStream<&[u8]>) -> Result<Token> {
    match stream.next()? {
        Some(tok) => Ok(tok),
        None => Err(Error::malformed(
            stream.current_path(),
            "unexpected end of input",
        )),
    }
}

/// Consume and discard one value, including a whole nested container.
fn skip_value(stream: &mut TokenStream<&[u8]>) -> Result<()> {
    let mut depth = 0usize;
    loop {
        match next_token(stream)? {
            Token::DocumentStart | Token::ArrayStart => depth += 1,
            Token::DocumentEnd | Token::ArrayEnd => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Token::Value(_) => {
                if depth == 0 {
                    return Ok(());
                }
            }
            Token::FieldName(_) => (),
        }
    }
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use super::*;
    use crate::error::StoreError;
    use crate::instance::{ObjHandle, ObjectArena};
    use crate::object_id::ObjectId;
    use crate::plan::FieldSet;
    use crate::schema::ModelRegistry;

    const ORIGIN: &str = "shop";

    fn model() -> ModelRegistry {
        let mut model = ModelRegistry::new();
        model
            .define(
                "Product",
                vec![
                    Property::id("_id"),
                    Property::simple("name"),
                    Property::simple("qty"),
                    Property::embedded("attributes", "Attribute").collection(),
                    Property::reference("stocks", "Stock").map(),
                    Property::reference("supplier", "Supplier"),
                    Property::reference("backup", "Supplier"),
                ],
            )
            .define(
                "Attribute",
                vec![Property::simple("name"), Property::simple("value")],
            )
            .define(
                "Stock",
                vec![
                    Property::id("_id"),
                    Property::simple("price"),
                    Property::simple("qty"),
                ],
            )
            .define(
                "Supplier",
                vec![
                    Property::id("_id"),
                    Property::simple("name"),
                    Property::simple("region"),
                ],
            )
            .define(
                "Author",
                vec![
                    Property::id("_id"),
                    Property::simple("name"),
                    Property::reference("book", "Book"),
                ],
            )
            .define(
                "Book",
                vec![
                    Property::id("_id"),
                    Property::simple("title"),
                    Property::reference("author", "Author"),
                ],
            );
        model
    }

    fn fields(pairs: Vec<(&str, Value)>) -> Vec<(String, Value)> {
        pairs.into_iter().map(|(n, v)| (n.to_string(), v)).collect()
    }

    fn oid(fill: u8) -> ObjectId {
        ObjectId::from_bytes([fill; 12])
    }

    /// In-memory store applying the requested projection server-side; the
    /// id field is always returned.
    #[derive(Default)]
    struct MemoryStore {
        docs: HashMap<(String, String, RefId), Vec<(String, Value)>>,
        log: RefCell<Vec<(String, RefId, Option<FieldSet>)>>,
    }

    impl MemoryStore {
        fn put(&mut self, collection: &str, id: impl Into<RefId>, doc: Vec<(String, Value)>) {
            self.docs
                .insert((ORIGIN.to_string(), collection.to_string(), id.into()), doc);
        }

        fn fetch_count(&self, collection: &str, id: &RefId) -> usize {
            self.log
                .borrow()
                .iter()
                .filter(|(c, i, _)| c == collection && i == id)
                .count()
        }

        fn last_fields(&self, collection: &str, id: &RefId) -> Option<Option<FieldSet>> {
            self.log
                .borrow()
                .iter()
                .rev()
                .find(|(c, i, _)| c == collection && i == id)
                .map(|(_, _, f)| f.clone())
        }
    }

    impl StoreClient for MemoryStore {
        fn fetch_one(
            &self,
            origin: &str,
            collection: &str,
            id: &RefId,
            fields: Option<&FieldSet>,
        ) -> Result<Option<RawDocument>, StoreError> {
            self.log
                .borrow_mut()
                .push((collection.to_string(), id.clone(), fields.cloned()));
            let doc = self
                .docs
                .get(&(origin.to_string(), collection.to_string(), id.clone()));
            Ok(doc.map(|doc| {
                let projected: Vec<(String, Value)> = match fields {
                    None => doc.clone(),
                    Some(set) => doc
                        .iter()
                        .filter(|(n, _)| n == "_id" || set.includes(n))
                        .cloned()
                        .collect(),
                };
                RawDocument::from_fields(&projected)
            }))
        }
    }

    struct FailingStore;

    impl StoreClient for FailingStore {
        fn fetch_one(
            &self,
            _origin: &str,
            _collection: &str,
            _id: &RefId,
            _fields: Option<&FieldSet>,
        ) -> Result<Option<RawDocument>, StoreError> {
            Err("connection reset".into())
        }
    }

    fn node<'a>(arena: &'a ObjectArena, handle: ObjHandle) -> &'a crate::instance::ObjectNode {
        arena.get(handle).unwrap()
    }

    fn scalar(v: impl Into<Value>) -> Materialized<ObjHandle> {
        Materialized::Scalar(v.into())
    }

    #[test]
    fn no_projection_materializes_everything() {
        let decoder = Decoder::new(model(), MemoryStore::default(), ORIGIN);
        let raw = RawDocument::from_fields(&fields(vec![
            ("_id", Value::from(oid(1))),
            ("name", Value::from("Milk")),
            ("qty", Value::Int32(12)),
            (
                "attributes",
                Value::Array(vec![Value::Document(fields(vec![
                    ("name", Value::from("fat")),
                    ("value", Value::from("3.2%")),
                ]))]),
            ),
        ]));
        let mut arena = ObjectArena::new();
        let root = decoder.decode(&mut arena, "Product", &raw, None).unwrap();
        let product = node(&arena, root);
        assert_eq!(product.field("_id"), Some(&scalar(oid(1))));
        assert_eq!(product.field("name"), Some(&scalar("Milk")));
        assert_eq!(product.field("qty"), Some(&scalar(12)));
        let Some(Materialized::Array(attrs)) = product.field("attributes") else {
            panic!("attributes not decoded as an array");
        };
        let Materialized::Instance(attr) = &attrs[0] else {
            panic!("attribute element is not an instance");
        };
        assert_eq!(node(&arena, *attr).ty(), "Attribute");
        assert_eq!(node(&arena, *attr).field("name"), Some(&scalar("fat")));
        assert!(product.is_complete());
    }

    #[test]
    fn root_projection_skips_fields_but_keeps_id() {
        let decoder = Decoder::new(model(), MemoryStore::default(), ORIGIN);
        let raw = RawDocument::from_fields(&fields(vec![
            ("_id", Value::from(oid(1))),
            ("name", Value::from("Milk")),
            ("qty", Value::Int32(12)),
        ]));
        let spec: InclusionSpec = ["name"].into_iter().collect();
        let mut arena = ObjectArena::new();
        let root = decoder
            .decode(&mut arena, "Product", &raw, Some(&spec))
            .unwrap();
        let product = node(&arena, root);
        assert_eq!(product.field("name"), Some(&scalar("Milk")));
        assert_eq!(product.field("_id"), Some(&scalar(oid(1))));
        assert_eq!(product.field("qty"), None);
    }

    #[test]
    fn reference_is_fetched_and_materialized() {
        let mut store = MemoryStore::default();
        store.put(
            "suppliers",
            oid(9),
            fields(vec![
                ("_id", Value::from(oid(9))),
                ("name", Value::from("Acme")),
            ]),
        );
        let decoder = Decoder::new(model(), store, ORIGIN);
        let raw = RawDocument::from_fields(&fields(vec![
            ("_id", Value::from(oid(1))),
            (
                "supplier",
                Value::Reference(DocumentRef::new("suppliers", oid(9))),
            ),
        ]));
        let mut arena = ObjectArena::new();
        let root = decoder.decode(&mut arena, "Product", &raw, None).unwrap();
        let Some(Materialized::Instance(supplier)) = node(&arena, root).field("supplier") else {
            panic!("supplier not materialized");
        };
        assert_eq!(node(&arena, *supplier).ty(), "Supplier");
        assert_eq!(node(&arena, *supplier).field("name"), Some(&scalar("Acme")));
    }

    #[test]
    fn repeated_reference_hits_the_cache() {
        let mut store = MemoryStore::default();
        store.put(
            "suppliers",
            oid(9),
            fields(vec![
                ("_id", Value::from(oid(9))),
                ("name", Value::from("Acme")),
            ]),
        );
        let decoder = Decoder::new(model(), store, ORIGIN);
        let raw = RawDocument::from_fields(&fields(vec![
            (
                "supplier",
                Value::Reference(DocumentRef::new("suppliers", oid(9))),
            ),
            (
                "backup",
                Value::Reference(DocumentRef::new("suppliers", oid(9))),
            ),
        ]));
        let mut arena = ObjectArena::new();
        let root = decoder.decode(&mut arena, "Product", &raw, None).unwrap();
        let product = node(&arena, root);
        assert_eq!(
            decoder.store.fetch_count("suppliers", &RefId::from(oid(9))),
            1
        );
        assert_eq!(product.field("supplier"), product.field("backup"));
    }

    #[test]
    fn differing_projections_fetch_independently() {
        let mut store = MemoryStore::default();
        store.put(
            "suppliers",
            oid(9),
            fields(vec![
                ("_id", Value::from(oid(9))),
                ("name", Value::from("Acme")),
                ("region", Value::from("north")),
            ]),
        );
        let decoder = Decoder::new(model(), store, ORIGIN);
        let raw = RawDocument::from_fields(&fields(vec![
            (
                "supplier",
                Value::Reference(DocumentRef::new("suppliers", oid(9))),
            ),
            (
                "backup",
                Value::Reference(DocumentRef::new("suppliers", oid(9))),
            ),
        ]));
        let spec: InclusionSpec = ["supplier.name", "backup"].into_iter().collect();
        let mut arena = ObjectArena::new();
        let root = decoder
            .decode(&mut arena, "Product", &raw, Some(&spec))
            .unwrap();
        let product = node(&arena, root);
        assert_eq!(
            decoder.store.fetch_count("suppliers", &RefId::from(oid(9))),
            2
        );
        let Some(Materialized::Instance(narrow)) = product.field("supplier") else {
            panic!("supplier not materialized");
        };
        let Some(Materialized::Instance(wide)) = product.field("backup") else {
            panic!("backup not materialized");
        };
        assert_ne!(narrow, wide);
        assert_eq!(node(&arena, *narrow).field("region"), None);
        assert_eq!(node(&arena, *wide).field("region"), Some(&scalar("north")));
    }

    #[test]
    fn map_key_projection_scopes_the_fetch() {
        let mut store = MemoryStore::default();
        store.put(
            "stocks",
            oid(2),
            fields(vec![
                ("_id", Value::from(oid(2))),
                ("price", Value::Double(2.5)),
                ("qty", Value::Int32(40)),
            ]),
        );
        store.put(
            "stocks",
            oid(3),
            fields(vec![
                ("_id", Value::from(oid(3))),
                ("price", Value::Double(9.0)),
            ]),
        );
        let decoder = Decoder::new(model(), store, ORIGIN);
        let raw = RawDocument::from_fields(&fields(vec![
            ("name", Value::from("Milk")),
            (
                "stocks",
                Value::Document(fields(vec![
                    ("1", Value::Reference(DocumentRef::new("stocks", oid(2)))),
                    ("10", Value::Reference(DocumentRef::new("stocks", oid(3)))),
                ])),
            ),
        ]));
        let spec: InclusionSpec = ["stocks.1.price"].into_iter().collect();
        let mut arena = ObjectArena::new();
        let root = decoder
            .decode(&mut arena, "Product", &raw, Some(&spec))
            .unwrap();
        let product = node(&arena, root);

        assert_eq!(decoder.store.fetch_count("stocks", &RefId::from(oid(2))), 1);
        assert_eq!(decoder.store.fetch_count("stocks", &RefId::from(oid(3))), 0);
        assert_eq!(
            decoder.store.last_fields("stocks", &RefId::from(oid(2))),
            Some(Some(["price"].into_iter().collect()))
        );

        let Some(Materialized::Map(stocks)) = product.field("stocks") else {
            panic!("stocks not materialized as a map");
        };
        assert_eq!(stocks.len(), 1);
        assert_eq!(stocks[0].0, "1");
        let Materialized::Instance(stock) = &stocks[0].1 else {
            panic!("stock entry is not an instance");
        };
        assert_eq!(node(&arena, *stock).field("price"), Some(&scalar(2.5)));
        assert_eq!(node(&arena, *stock).field("qty"), None);
        // the root projection also drops unrequested root fields
        assert_eq!(product.field("name"), None);
    }

    #[test]
    fn cycle_resolves_to_the_same_instance() {
        let mut store = MemoryStore::default();
        store.put(
            "books",
            oid(20),
            fields(vec![
                ("_id", Value::from(oid(20))),
                ("title", Value::from("Vade mecum")),
                (
                    "author",
                    Value::Reference(DocumentRef::new("authors", oid(10))),
                ),
            ]),
        );
        let decoder = Decoder::new(model(), store, ORIGIN);
        let raw = RawDocument::from_fields(&fields(vec![
            ("_id", Value::from(oid(10))),
            ("name", Value::from("Someone")),
            ("book", Value::Reference(DocumentRef::new("books", oid(20)))),
        ]));
        let mut arena = ObjectArena::new();
        let root = decoder.decode(&mut arena, "Author", &raw, None).unwrap();
        let Some(Materialized::Instance(book)) = node(&arena, root).field("book") else {
            panic!("book not materialized");
        };
        // the back-reference observed the root author through the cache
        assert_eq!(
            node(&arena, *book).field("author"),
            Some(&Materialized::Instance(root))
        );
        assert_eq!(
            decoder.store.fetch_count("authors", &RefId::from(oid(10))),
            0
        );
        assert_eq!(decoder.store.fetch_count("books", &RefId::from(oid(20))), 1);
    }

    #[test]
    fn unresolved_reference_degrades_to_missing() {
        let decoder = Decoder::new(model(), MemoryStore::default(), ORIGIN);
        let raw = RawDocument::from_fields(&fields(vec![
            (
                "supplier",
                Value::Reference(DocumentRef::new("suppliers", oid(9))),
            ),
            ("name", Value::from("Milk")),
        ]));
        let mut arena = ObjectArena::new();
        let root = decoder.decode(&mut arena, "Product", &raw, None).unwrap();
        let product = node(&arena, root);
        assert_eq!(product.field("supplier"), Some(&Materialized::Missing));
        // decoding continued past the absence
        assert_eq!(product.field("name"), Some(&scalar("Milk")));
    }

    #[test]
    fn store_failure_aborts_the_decode() {
        let decoder = Decoder::new(model(), FailingStore, ORIGIN);
        let raw = RawDocument::from_fields(&fields(vec![(
            "supplier",
            Value::Reference(DocumentRef::new("suppliers", oid(9))),
        )]));
        let mut arena = ObjectArena::new();
        let err = decoder
            .decode(&mut arena, "Product", &raw, None)
            .unwrap_err();
        match err {
            Error::StoreFetch {
                path, collection, ..
            } => {
                assert_eq!(path, "supplier");
                assert_eq!(collection, "suppliers");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn malformed_bytes_abort_the_decode() {
        let raw = RawDocument::from_fields(&fields(vec![("name", Value::from("Milk"))]));
        let cut = RawDocument::new(raw.as_bytes()[..raw.len() - 4].to_vec());
        let decoder = Decoder::new(model(), MemoryStore::default(), ORIGIN);
        let mut arena = ObjectArena::new();
        assert!(matches!(
            decoder.decode(&mut arena, "Product", &cut, None),
            Err(Error::MalformedDocument { .. })
        ));
    }

    #[test]
    fn undeclared_fields_are_skipped() {
        let decoder = Decoder::new(model(), MemoryStore::default(), ORIGIN);
        let raw = RawDocument::from_fields(&fields(vec![
            ("name", Value::from("Milk")),
            (
                "color",
                Value::Document(fields(vec![("r", Value::Int32(255))])),
            ),
            ("qty", Value::Int32(3)),
        ]));
        let mut arena = ObjectArena::new();
        let root = decoder.decode(&mut arena, "Product", &raw, None).unwrap();
        let product = node(&arena, root);
        assert_eq!(product.field("color"), None);
        assert_eq!(product.field("qty"), Some(&scalar(3)));
    }

    #[test]
    fn null_reference_stays_null() {
        let decoder = Decoder::new(model(), MemoryStore::default(), ORIGIN);
        let raw =
            RawDocument::from_fields(&fields(vec![("supplier", Value::Null)]));
        let mut arena = ObjectArena::new();
        let root = decoder.decode(&mut arena, "Product", &raw, None).unwrap();
        assert_eq!(node(&arena, root).field("supplier"), Some(&scalar(Value::Null)));
    }

    #[test]
    fn legacy_pointer_resolves_like_a_reference() {
        use crate::marker::ElementType;
        let mut store = MemoryStore::default();
        store.put(
            "suppliers",
            oid(5),
            fields(vec![
                ("_id", Value::from(oid(5))),
                ("name", Value::from("Acme")),
            ]),
        );
        let decoder = Decoder::new(model(), store, ORIGIN);

        let mut body = vec![ElementType::DbPointer.into_u8()];
        body.extend_from_slice(b"supplier\0");
        let ns = "shop.suppliers";
        body.extend_from_slice(&((ns.len() + 1) as i32).to_le_bytes());
        body.extend_from_slice(ns.as_bytes());
        body.push(0);
        body.extend_from_slice(oid(5).as_bytes());
        let mut bytes = ((4 + body.len() + 1) as i32).to_le_bytes().to_vec();
        bytes.extend_from_slice(&body);
        bytes.push(0);

        let mut arena = ObjectArena::new();
        let root = decoder
            .decode(&mut arena, "Product", &RawDocument::new(bytes), None)
            .unwrap();
        let Some(Materialized::Instance(supplier)) = node(&arena, root).field("supplier") else {
            panic!("pointer did not resolve");
        };
        assert_eq!(node(&arena, *supplier).field("name"), Some(&scalar("Acme")));
    }

    #[test]
    fn shared_plan_is_reusable_across_calls() {
        let decoder = Decoder::new(model(), MemoryStore::default(), ORIGIN);
        let spec: InclusionSpec = ["name"].into_iter().collect();
        let plan = decoder.plan("Product", &spec);
        let raw = RawDocument::from_fields(&fields(vec![
            ("name", Value::from("Milk")),
            ("qty", Value::Int32(1)),
        ]));
        for _ in 0..2 {
            let mut arena = ObjectArena::new();
            let root = decoder
                .decode_with_plan(&mut arena, "Product", &raw, &plan)
                .unwrap();
            assert_eq!(node(&arena, root).field("qty"), None);
            assert_eq!(node(&arena, root).field("name"), Some(&scalar("Milk")));
        }
    }
}
