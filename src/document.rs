use std::fmt;

use crate::error::{Error, Result};
use crate::token::{Scalar, Token, TokenStream};
use crate::value::{encode_document, DocumentRef, RefId, Value};

/// Opaque wire bytes of one document, immutable once read from the store
/// and owned by the decode call that received it.
#[derive(Clone, PartialEq, Eq)]
pub struct RawDocument {
    bytes: Vec<u8>,
}

impl RawDocument {
    pub fn new(bytes: Vec<u8>) -> Self {
        RawDocument { bytes }
    }

    /// Encode an ordered field list into a fresh document.
    pub fn from_fields(fields: &[(String, Value)]) -> Self {
        RawDocument {
            bytes: encode_document(fields),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// A token stream over this document's bytes.
    pub fn stream(&self) -> TokenStream<&[u8]> {
        TokenStream::new(self.bytes.as_slice())
    }

    /// Decode the whole document into an owned field list, with no
    /// projection applied. Embedded `{$ref, $id, $db?}` documents come back
    /// as [`Value::Reference`].
    pub fn decode_all(&self) -> Result<Vec<(String, Value)>> {
        let mut stream = self.stream();
        match stream.next()? {
            Some(Token::DocumentStart) => (),
            _ => return Err(Error::malformed("", "missing document start")),
        }
        read_document_body(&mut stream)
    }
}

impl fmt::Debug for RawDocument {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "RawDocument({} bytes)", self.bytes.len())
    }
}

impl From<Vec<u8>> for RawDocument {
    fn from(bytes: Vec<u8>) -> Self {
        RawDocument { bytes }
    }
}

pub(crate) fn read_document_body(
    stream: &mut TokenStream<&[u8]>,
) -> Result<Vec<(String, Value)>> {
    let mut fields = Vec::new();
    loop {
        match stream.next()? {
            Some(Token::FieldName(name)) => {
                let value = read_value(stream)?;
                fields.push((name, value));
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
    Ok(fields)
}

fn read_array_body(stream: &mut TokenStream<&[u8]>) -> Result<Vec<Value>> {
    let mut items = Vec::new();
    loop {
        match stream.next()? {
            Some(Token::Value(scalar)) => items.push(value_from_scalar(scalar)?),
            Some(Token::DocumentStart) => {
                items.push(collapse_reference(read_document_body(stream)?))
            }
            Some(Token::ArrayStart) => items.push(Value::Array(read_array_body(stream)?)),
            Some(Token::ArrayEnd) => break,
            Some(tok) => {
                return Err(Error::malformed(
                    stream.current_path(),
                    format!("unexpected token {:?} in array", tok),
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
    Ok(items)
}

pub(crate) fn read_value(stream: &mut TokenStream<&[u8]>) -> Result<Value> {
    match stream.next()? {
        Some(tok) => read_value_from(stream, tok),
        None => Err(Error::malformed(
            stream.current_path(),
            "unexpected end of input",
        )),
    }
}

/// Continue reading a value whose first token has already been consumed.
pub(crate) fn read_value_from(stream: &mut TokenStream<&[u8]>, token: Token) -> Result<Value> {
    match token {
        Token::Value(scalar) => value_from_scalar(scalar),
        Token::DocumentStart => Ok(collapse_reference(read_document_body(stream)?)),
        Token::ArrayStart => Ok(Value::Array(read_array_body(stream)?)),
        tok => Err(Error::malformed(
            stream.current_path(),
            format!("expected a value, got {:?}", tok),
        )),
    }
}

fn value_from_scalar(scalar: Scalar) -> Result<Value> {
    Ok(match scalar {
        Scalar::Double(v) => Value::Double(v),
        Scalar::String(v) => Value::String(v),
        Scalar::ObjectId(v) => Value::ObjectId(v),
        Scalar::Bool(v) => Value::Bool(v),
        Scalar::DateTime(v) => Value::DateTime(v),
        Scalar::Null => Value::Null,
        Scalar::Regex { pattern, options } => Value::Regex { pattern, options },
        Scalar::DbPointer { namespace, id } => {
            // legacy pointers collapse to a reference
            let (origin, collection) = match namespace.split_once('.') {
                Some((db, coll)) => (Some(db.to_string()), coll.to_string()),
                None => (None, namespace),
            };
            Value::Reference(DocumentRef {
                collection,
                id: RefId::ObjectId(id),
                origin,
            })
        }
        Scalar::JavaScript(code) => Value::JavaScript(code),
        Scalar::Symbol(v) => Value::Symbol(v),
        Scalar::JavaScriptWithScope { code, scope } => Value::JavaScriptWithScope {
            code,
            scope: RawDocument::new(scope).decode_all()?,
        },
        Scalar::Int32(v) => Value::Int32(v),
        Scalar::Timestamp { time, increment } => Value::Timestamp { time, increment },
        Scalar::Int64(v) => Value::Int64(v),
        Scalar::Binary { subtype, bytes } => Value::Binary { subtype, bytes },
        Scalar::MinKey => Value::MinKey,
        Scalar::MaxKey => Value::MaxKey,
    })
}

/// Recognize the `{$ref, $id, $db?}` convention; anything else stays a
/// plain document.
pub(crate) fn collapse_reference(fields: Vec<(String, Value)>) -> Value {
    let collection = fields.iter().find_map(|(n, v)| {
        if n == "$ref" {
            v.as_str().map(String::from)
        } else {
            None
        }
    });
    let id = fields.iter().find_map(|(n, v)| {
        if n == "$id" {
            RefId::from_value(v)
        } else {
            None
        }
    });
    match (collection, id) {
        (Some(collection), Some(id)) => {
            let origin = fields.iter().find_map(|(n, v)| {
                if n == "$db" {
                    v.as_str().map(String::from)
                } else {
                    None
                }
            });
            Value::Reference(DocumentRef {
                collection,
                id,
                origin,
            })
        }
        _ => Value::Document(fields),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::object_id::ObjectId;

    fn fields(pairs: Vec<(&str, Value)>) -> Vec<(String, Value)> {
        pairs.into_iter().map(|(n, v)| (n.to_string(), v)).collect()
    }

    #[test]
    fn roundtrip_preserves_every_field() {
        let original = fields(vec![
            ("_id", Value::ObjectId(ObjectId::from_bytes([3u8; 12]))),
            ("name", Value::from("Milk")),
            ("price", Value::Double(2.5)),
            ("qty", Value::Int32(12)),
            ("big", Value::Int64(1 << 40)),
            ("fresh", Value::from(true)),
            ("added", Value::DateTime(1356351330500)),
            ("nothing", Value::Null),
            (
                "tags",
                Value::Array(vec![Value::from("dairy"), Value::from("chilled")]),
            ),
            (
                "origin",
                Value::Document(fields(vec![
                    ("country", Value::from("PL")),
                    ("farm", Value::from("A1")),
                ])),
            ),
            (
                "blob",
                Value::Binary {
                    subtype: 0,
                    bytes: vec![1, 2, 3],
                },
            ),
            (
                "match",
                Value::Regex {
                    pattern: "^m".into(),
                    options: "i".into(),
                },
            ),
            (
                "stamp",
                Value::Timestamp {
                    time: 1700000000,
                    increment: 4,
                },
            ),
            ("sym", Value::Symbol("s".into())),
            ("code", Value::JavaScript("f()".into())),
            (
                "scoped",
                Value::JavaScriptWithScope {
                    code: "g()".into(),
                    scope: fields(vec![("x", Value::Int32(1))]),
                },
            ),
            ("low", Value::MinKey),
            ("high", Value::MaxKey),
        ]);
        let raw = RawDocument::from_fields(&original);
        let decoded = raw.decode_all().unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn reference_roundtrip() {
        let original = fields(vec![
            (
                "supplier",
                Value::Reference(
                    DocumentRef::new("suppliers", RefId::Int(7)).with_origin("warehouse"),
                ),
            ),
            (
                "alt",
                Value::Reference(DocumentRef::new(
                    "suppliers",
                    ObjectId::from_bytes([8u8; 12]),
                )),
            ),
        ]);
        let raw = RawDocument::from_fields(&original);
        assert_eq!(raw.decode_all().unwrap(), original);
    }

    #[test]
    fn dollar_doc_without_id_stays_a_document() {
        let original = fields(vec![(
            "odd",
            Value::Document(fields(vec![("$ref", Value::from("things"))])),
        )]);
        let raw = RawDocument::from_fields(&original);
        assert_eq!(raw.decode_all().unwrap(), original);
    }

    #[test]
    fn legacy_pointer_collapses_to_reference() {
        use crate::marker::ElementType;
        // hand-build a document holding a 0x0c pointer into "shop.products"
        let mut body = vec![ElementType::DbPointer.into_u8()];
        body.extend_from_slice(b"p\0");
        let ns = "shop.products";
        body.extend_from_slice(&((ns.len() + 1) as i32).to_le_bytes());
        body.extend_from_slice(ns.as_bytes());
        body.push(0);
        body.extend_from_slice(&[5u8; 12]);
        let mut bytes = ((4 + body.len() + 1) as i32).to_le_bytes().to_vec();
        bytes.extend_from_slice(&body);
        bytes.push(0);

        let decoded = RawDocument::new(bytes).decode_all().unwrap();
        assert_eq!(
            decoded,
            fields(vec![(
                "p",
                Value::Reference(
                    DocumentRef::new("products", ObjectId::from_bytes([5u8; 12]))
                        .with_origin("shop"),
                ),
            )])
        );
    }

    #[test]
    fn truncated_document_is_fatal() {
        let raw = RawDocument::from_fields(&fields(vec![("a", Value::Int32(1))]));
        let cut = RawDocument::new(raw.as_bytes()[..raw.len() - 3].to_vec());
        assert!(cut.decode_all().is_err());
    }
}
