//! docsift is a selective, reference-aware decoder for nested binary
//! documents of the BSON family. It materializes typed object graphs from
//! stored documents without decoding them blindly:
//!
//! - A streaming token parser walks one length-prefixed document forward,
//!   never materializing the full tree, and knows the dotted field path to
//!   whatever it is currently reading.
//! - A projection plan, resolved once per (entity type, inclusion spec)
//!   pair, tells the decoder which sibling fields to materialize at every
//!   reachable path — and which subset to ask the store for when a
//!   reference at that path has to be fetched.
//! - References (`{ "$ref", "$id", "$db"? }` documents, or legacy
//!   pointers) are resolved lazily through a per-session cache keyed by
//!   (type, id, origin, projection), so one identity is fetched at most
//!   once per session and cycles resolve to the same instance instead of
//!   recursing forever.
//!
//! The decoder builds instances through three narrow collaborator traits:
//! [`EntityModel`] (what fields a type declares), [`StoreClient`] (how a
//! referenced document is fetched), and [`InstanceBuilder`] (how decoded
//! fields become a constructed instance). Map-backed and arena-backed
//! implementations of the first and last ship with the crate.
//!
//! ```
//! use docsift::{
//!     Decoder, InclusionSpec, ObjectArena, ModelRegistry, Property,
//!     RawDocument, Value,
//! };
//! # use docsift::{FieldSet, RefId, StoreClient, StoreError};
//! # struct NoStore;
//! # impl StoreClient for NoStore {
//! #     fn fetch_one(&self, _: &str, _: &str, _: &RefId, _: Option<&FieldSet>)
//! #         -> Result<Option<RawDocument>, StoreError> { Ok(None) }
//! # }
//!
//! let mut model = ModelRegistry::new();
//! model.define(
//!     "Product",
//!     vec![Property::id("_id"), Property::simple("name"), Property::simple("qty")],
//! );
//! let decoder = Decoder::new(model, NoStore, "shop");
//!
//! let raw = RawDocument::from_fields(&[
//!     ("name".to_string(), Value::from("Milk")),
//!     ("qty".to_string(), Value::from(12)),
//! ]);
//! let spec: InclusionSpec = ["name"].into_iter().collect();
//! let mut arena = ObjectArena::new();
//! let root = decoder.decode(&mut arena, "Product", &raw, Some(&spec))?;
//! assert!(arena.get(root).unwrap().field("qty").is_none());
//! # Ok::<(), docsift::Error>(())
//! ```

mod cache;
mod decode;
mod document;
mod error;
mod instance;
mod marker;
mod object_id;
mod path;
mod plan;
mod schema;
mod store;
mod token;
mod value;

pub use self::cache::{RefKey, ReferenceCache};
pub use self::decode::Decoder;
pub use self::document::RawDocument;
pub use self::error::{Error, Result, StoreError};
pub use self::instance::{InstanceBuilder, Materialized, ObjHandle, ObjectArena, ObjectNode};
pub use self::marker::ElementType;
pub use self::object_id::ObjectId;
pub use self::path::PathStack;
pub use self::plan::{resolve_projection_plan, FieldSet, InclusionSpec, ProjectionPlan};
pub use self::schema::{Container, EntityModel, ModelRegistry, Property, ValueKind};
pub use self::store::StoreClient;
pub use self::token::{Scalar, Token, TokenStream};
pub use self::value::{encode_document, DocumentRef, RefId, Value};

/// The maximum allowed size of one raw document is 1 MiB. A document whose
/// declared length exceeds this fails as malformed before any of its
/// elements are read.
pub const MAX_DOC_SIZE: usize = 1usize << 20; // 1 MiB

/// The maximum container nesting depth within one document. Deeper
/// documents fail as malformed at the container that crosses the limit.
pub const MAX_DEPTH: usize = 100;
