use std::fmt;

use serde::{Deserialize, Serialize};

use crate::marker::{ElementType, TYPE_END};
use crate::object_id::ObjectId;

/// Identity of a referenced document. Only identities with a total equality
/// can key the reference cache; documents using other scalar kinds as a
/// reference id are rejected at decode time.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RefId {
    ObjectId(ObjectId),
    String(String),
    Int(i64),
}

impl RefId {
    /// The identity a decoded value can serve as, if any.
    pub fn from_value(value: &Value) -> Option<RefId> {
        match value {
            Value::ObjectId(id) => Some(RefId::ObjectId(*id)),
            Value::String(s) => Some(RefId::String(s.clone())),
            Value::Int32(v) => Some(RefId::Int(*v as i64)),
            Value::Int64(v) => Some(RefId::Int(*v)),
            _ => None,
        }
    }
}

impl fmt::Display for RefId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RefId::ObjectId(id) => write!(f, "{}", id),
            RefId::String(s) => f.write_str(s),
            RefId::Int(v) => write!(f, "{}", v),
        }
    }
}

impl From<ObjectId> for RefId {
    fn from(id: ObjectId) -> Self {
        RefId::ObjectId(id)
    }
}

impl From<&str> for RefId {
    fn from(s: &str) -> Self {
        RefId::String(s.to_string())
    }
}

impl From<i64> for RefId {
    fn from(v: i64) -> Self {
        RefId::Int(v)
    }
}

/// Pointer-by-identifier to a document stored separately, possibly in a
/// different origin store. On the wire this is an embedded document of the
/// shape `{ "$ref": <collection>, "$id": <id>, "$db": <origin>? }`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    pub collection: String,
    pub id: RefId,
    pub origin: Option<String>,
}

impl DocumentRef {
    pub fn new(collection: impl Into<String>, id: impl Into<RefId>) -> Self {
        DocumentRef {
            collection: collection.into(),
            id: id.into(),
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

/// Owned document value tree. Documents keep their on-wire field order.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Double(f64),
    String(String),
    Document(Vec<(String, Value)>),
    Array(Vec<Value>),
    Binary { subtype: u8, bytes: Vec<u8> },
    ObjectId(ObjectId),
    Bool(bool),
    DateTime(i64),
    Null,
    Regex { pattern: String, options: String },
    JavaScript(String),
    JavaScriptWithScope { code: String, scope: Vec<(String, Value)> },
    Symbol(String),
    Int32(i32),
    Timestamp { time: u32, increment: u32 },
    Int64(i64),
    MinKey,
    MaxKey,
    Reference(DocumentRef),
}

impl Value {
    /// Field lookup on a `Document` value; `None` for other kinds.
    pub fn get(&self, field: &str) -> Option<&Value> {
        match self {
            Value::Document(fields) => {
                fields.iter().find(|(n, _)| n == field).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<ObjectId> for Value {
    fn from(v: ObjectId) -> Self {
        Value::ObjectId(v)
    }
}

impl From<DocumentRef> for Value {
    fn from(v: DocumentRef) -> Self {
        Value::Reference(v)
    }
}

/// Serialize an ordered field list as one wire document.
pub fn encode_document(fields: &[(String, Value)]) -> Vec<u8> {
    let mut buf = Vec::new();
    write_document(&mut buf, fields);
    buf
}

fn write_document(buf: &mut Vec<u8>, fields: &[(String, Value)]) {
    let start = buf.len();
    buf.extend_from_slice(&[0; 4]);
    for (name, value) in fields {
        write_element(buf, name, value);
    }
    buf.push(TYPE_END);
    patch_len(buf, start);
}

fn patch_len(buf: &mut [u8], start: usize) {
    let len = (buf.len() - start) as i32;
    buf[start..start + 4].copy_from_slice(&len.to_le_bytes());
}

fn write_cstring(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&((s.len() + 1) as i32).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

fn write_element(buf: &mut Vec<u8>, name: &str, value: &Value) {
    let tag = |v: &Value| -> ElementType {
        match v {
            Value::Double(_) => ElementType::Double,
            Value::String(_) => ElementType::String,
            Value::Document(_) | Value::Reference(_) => ElementType::Document,
            Value::Array(_) => ElementType::Array,
            Value::Binary { .. } => ElementType::Binary,
            Value::ObjectId(_) => ElementType::ObjectId,
            Value::Bool(_) => ElementType::Bool,
            Value::DateTime(_) => ElementType::DateTime,
            Value::Null => ElementType::Null,
            Value::Regex { .. } => ElementType::Regex,
            Value::JavaScript(_) => ElementType::JavaScript,
            Value::JavaScriptWithScope { .. } => ElementType::JavaScriptWithScope,
            Value::Symbol(_) => ElementType::Symbol,
            Value::Int32(_) => ElementType::Int32,
            Value::Timestamp { .. } => ElementType::Timestamp,
            Value::Int64(_) => ElementType::Int64,
            Value::MinKey => ElementType::MinKey,
            Value::MaxKey => ElementType::MaxKey,
        }
    };
    buf.push(tag(value).into_u8());
    write_cstring(buf, name);
    match value {
        Value::Double(v) => buf.extend_from_slice(&v.to_le_bytes()),
        Value::String(v) => write_string(buf, v),
        Value::Document(fields) => write_document(buf, fields),
        Value::Array(items) => {
            let start = buf.len();
            buf.extend_from_slice(&[0; 4]);
            for (i, item) in items.iter().enumerate() {
                write_element(buf, &i.to_string(), item);
            }
            buf.push(TYPE_END);
            patch_len(buf, start);
        }
        Value::Binary { subtype, bytes } => {
            buf.extend_from_slice(&(bytes.len() as i32).to_le_bytes());
            buf.push(*subtype);
            buf.extend_from_slice(bytes);
        }
        Value::ObjectId(id) => buf.extend_from_slice(id.as_bytes()),
        Value::Bool(v) => buf.push(*v as u8),
        Value::DateTime(v) => buf.extend_from_slice(&v.to_le_bytes()),
        Value::Null | Value::MinKey | Value::MaxKey => (),
        Value::Regex { pattern, options } => {
            write_cstring(buf, pattern);
            write_cstring(buf, options);
        }
        Value::JavaScript(code) => write_string(buf, code),
        Value::JavaScriptWithScope { code, scope } => {
            let start = buf.len();
            buf.extend_from_slice(&[0; 4]);
            write_string(buf, code);
            write_document(buf, scope);
            patch_len(buf, start);
        }
        Value::Symbol(v) => write_string(buf, v),
        Value::Int32(v) => buf.extend_from_slice(&v.to_le_bytes()),
        Value::Timestamp { time, increment } => {
            buf.extend_from_slice(&increment.to_le_bytes());
            buf.extend_from_slice(&time.to_le_bytes());
        }
        Value::Int64(v) => buf.extend_from_slice(&v.to_le_bytes()),
        Value::Reference(dref) => {
            let mut fields = vec![
                ("$ref".to_string(), Value::String(dref.collection.clone())),
                (
                    "$id".to_string(),
                    match &dref.id {
                        RefId::ObjectId(id) => Value::ObjectId(*id),
                        RefId::String(s) => Value::String(s.clone()),
                        RefId::Int(v) => Value::Int64(*v),
                    },
                ),
            ];
            if let Some(origin) = &dref.origin {
                fields.push(("$db".to_string(), Value::String(origin.clone())));
            }
            write_document(buf, &fields);
        }
    }
}
