/// Closes a document or array; not an element tag of its own.
pub const TYPE_END: u8 = 0x00;

/// Legacy binary subtype carrying a second nested length prefix.
pub const SUBTYPE_BINARY_OLD: u8 = 0x02;

/// Element type tags of the wire format. The byte values are part of the
/// stored-document protocol and must never change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementType {
    Double,
    String,
    Document,
    Array,
    Binary,
    Undefined,
    ObjectId,
    Bool,
    DateTime,
    Null,
    Regex,
    DbPointer,
    JavaScript,
    Symbol,
    JavaScriptWithScope,
    Int32,
    Timestamp,
    Int64,
    MaxKey,
    MinKey,
}

impl ElementType {
    /// Construct an element type from a tag byte. Returns `None` for
    /// unassigned or reserved tags; those are a malformed document.
    pub fn from_u8(n: u8) -> Option<ElementType> {
        match n {
            0x01 => Some(ElementType::Double),
            0x02 => Some(ElementType::String),
            0x03 => Some(ElementType::Document),
            0x04 => Some(ElementType::Array),
            0x05 => Some(ElementType::Binary),
            0x06 => Some(ElementType::Undefined),
            0x07 => Some(ElementType::ObjectId),
            0x08 => Some(ElementType::Bool),
            0x09 => Some(ElementType::DateTime),
            0x0a => Some(ElementType::Null),
            0x0b => Some(ElementType::Regex),
            0x0c => Some(ElementType::DbPointer),
            0x0d => Some(ElementType::JavaScript),
            0x0e => Some(ElementType::Symbol),
            0x0f => Some(ElementType::JavaScriptWithScope),
            0x10 => Some(ElementType::Int32),
            0x11 => Some(ElementType::Timestamp),
            0x12 => Some(ElementType::Int64),
            0x7f => Some(ElementType::MaxKey),
            0xff => Some(ElementType::MinKey),
            _ => None,
        }
    }

    /// Converts an element type into its single-byte tag.
    pub fn into_u8(self) -> u8 {
        match self {
            ElementType::Double => 0x01,
            ElementType::String => 0x02,
            ElementType::Document => 0x03,
            ElementType::Array => 0x04,
            ElementType::Binary => 0x05,
            ElementType::Undefined => 0x06,
            ElementType::ObjectId => 0x07,
            ElementType::Bool => 0x08,
            ElementType::DateTime => 0x09,
            ElementType::Null => 0x0a,
            ElementType::Regex => 0x0b,
            ElementType::DbPointer => 0x0c,
            ElementType::JavaScript => 0x0d,
            ElementType::Symbol => 0x0e,
            ElementType::JavaScriptWithScope => 0x0f,
            ElementType::Int32 => 0x10,
            ElementType::Timestamp => 0x11,
            ElementType::Int64 => 0x12,
            ElementType::MaxKey => 0x7f,
            ElementType::MinKey => 0xff,
        }
    }
}

impl From<ElementType> for u8 {
    fn from(val: ElementType) -> u8 {
        val.into_u8()
    }
}
