use std::io::{ErrorKind, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{Error, Result};
use crate::marker::{ElementType, SUBTYPE_BINARY_OLD, TYPE_END};
use crate::object_id::ObjectId;
use crate::{MAX_DEPTH, MAX_DOC_SIZE};

/// One decoded leaf value from the stream.
#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
    Double(f64),
    String(String),
    ObjectId(ObjectId),
    Bool(bool),
    /// UTC datetime, milliseconds since the epoch.
    DateTime(i64),
    Null,
    Regex {
        pattern: String,
        options: String,
    },
    /// Legacy pointer to a document in another namespace.
    DbPointer {
        namespace: String,
        id: ObjectId,
    },
    JavaScript(String),
    Symbol(String),
    /// Code plus its scope document, captured as raw wire bytes. The scope
    /// can be decoded with another [`TokenStream`] over those bytes.
    JavaScriptWithScope {
        code: String,
        scope: Vec<u8>,
    },
    Int32(i32),
    Timestamp {
        time: u32,
        increment: u32,
    },
    Int64(i64),
    Binary {
        subtype: u8,
        bytes: Vec<u8>,
    },
    MinKey,
    MaxKey,
}

impl Scalar {
    /// Compile a `Regex` scalar into a [`regex::Regex`], translating the
    /// wire option characters onto inline flags. The `l` and `x` options
    /// have no equivalent and are dropped. Returns `None` for other kinds.
    pub fn compile(&self) -> Option<std::result::Result<regex::Regex, regex::Error>> {
        let Scalar::Regex { pattern, options } = self else {
            return None;
        };
        let mut flags = String::new();
        for c in options.chars() {
            match c {
                'i' | 'm' | 's' | 'u' => flags.push(c),
                _ => (),
            }
        }
        Some(if flags.is_empty() {
            regex::Regex::new(pattern)
        } else {
            regex::Regex::new(&format!("(?{}){}", flags, pattern))
        })
    }
}

/// One parse event from a [`TokenStream`].
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    DocumentStart,
    DocumentEnd,
    ArrayStart,
    ArrayEnd,
    /// A field name inside a document; the field's value follows on the
    /// next call. Array elements are positional and never produce this.
    FieldName(String),
    Value(Scalar),
}

/// One open container on the stream.
#[derive(Debug)]
struct Frame {
    array: bool,
    /// Absolute offset one past the container's closing byte.
    end: u64,
    /// Field currently being read inside this container; `None` in arrays.
    field: Option<String>,
}

/// Forward-only, pull-based parser over a length-prefixed nested binary
/// document. Consumed bytes are gone; projection decisions must be made
/// from the reconstructed path, never by peeking ahead.
///
/// The parser honors each container's declared byte length, so several
/// documents can be read back-to-back from one source; [`TokenStream::next`]
/// returns `Ok(None)` once the source is cleanly exhausted.
#[derive(Debug)]
pub struct TokenStream<R: Read> {
    input: Option<R>,
    pos: u64,
    frames: Vec<Frame>,
    /// Element type whose value is read on the next call, set when a field
    /// name has just been emitted.
    pending: Option<ElementType>,
}

impl<R: Read> TokenStream<R> {
    pub fn new(input: R) -> Self {
        Self {
            input: Some(input),
            pos: 0,
            frames: Vec::new(),
            pending: None,
        }
    }

    /// Pull the next token. `Ok(None)` once the underlying source is
    /// exhausted at a document boundary, or after [`TokenStream::close`].
    pub fn next(&mut self) -> Result<Option<Token>> {
        if self.input.is_none() {
            return Ok(None);
        }
        if let Some(ty) = self.pending.take() {
            return self.read_value(ty).map(Some);
        }
        if self.frames.is_empty() {
            return if self.begin_top_document()? {
                Ok(Some(Token::DocumentStart))
            } else {
                Ok(None)
            };
        }
        loop {
            let tag = self.read_u8("reading element tag")?;
            if tag == TYPE_END {
                let frame = self.frames.pop().expect("open container");
                if self.pos != frame.end {
                    return Err(Error::malformed(
                        self.current_path(),
                        format!(
                            "container length mismatch: declared end at byte {}, closed at {}",
                            frame.end, self.pos
                        ),
                    ));
                }
                return Ok(Some(if frame.array {
                    Token::ArrayEnd
                } else {
                    Token::DocumentEnd
                }));
            }
            let Some(ty) = ElementType::from_u8(tag) else {
                return Err(Error::malformed(
                    self.current_path(),
                    format!("unknown element type 0x{:02x}", tag),
                ));
            };
            if ty == ElementType::Undefined {
                // undefined elements are dropped without a token
                self.read_cstring("skipping undefined element")?;
                continue;
            }
            let in_array = self.frames.last().map(|f| f.array).unwrap_or(false);
            if in_array {
                // positional: the on-wire index name is discarded
                self.read_cstring("discarding array index")?;
                return self.read_value(ty).map(Some);
            }
            let name = self.read_cstring("reading field name")?;
            if let Some(f) = self.frames.last_mut() {
                f.field = Some(name.clone());
            }
            self.pending = Some(ty);
            return Ok(Some(Token::FieldName(name)));
        }
    }

    /// Dotted field path from the document root to the element currently
    /// being read. Array elements contribute no segment. Empty at the root.
    pub fn current_path(&self) -> String {
        let mut path = String::new();
        for frame in &self.frames {
            if let Some(field) = frame.field.as_deref() {
                if !path.is_empty() {
                    path.push('.');
                }
                path.push_str(field);
            }
        }
        path
    }

    /// Number of open containers.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Bytes consumed from the source so far.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Release the underlying byte source. Further calls to
    /// [`TokenStream::next`] return `Ok(None)`; closing twice is a no-op.
    pub fn close(&mut self) {
        self.input = None;
    }

    pub fn is_closed(&self) -> bool {
        self.input.is_none()
    }

    fn begin_top_document(&mut self) -> Result<bool> {
        let input = self.input.as_mut().expect("open input");
        let mut buf = [0u8; 4];
        let mut filled = 0;
        while filled < buf.len() {
            match input.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(false),
                Ok(0) => {
                    return Err(Error::malformed(
                        "",
                        "not enough bytes for document length",
                    ))
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(Error::malformed(
                        "",
                        format!("failed reading document length: {}", e),
                    ))
                }
            }
        }
        self.pos += 4;
        self.push_frame(false, i32::from_le_bytes(buf))?;
        Ok(true)
    }

    fn read_value(&mut self, ty: ElementType) -> Result<Token> {
        let scalar = match ty {
            ElementType::Document => {
                let len = self.read_i32("reading document length")?;
                self.push_frame(false, len)?;
                return Ok(Token::DocumentStart);
            }
            ElementType::Array => {
                let len = self.read_i32("reading array length")?;
                self.push_frame(true, len)?;
                return Ok(Token::ArrayStart);
            }
            ElementType::Double => Scalar::Double(self.read_f64("reading double")?),
            ElementType::String => Scalar::String(self.read_string("reading string")?),
            ElementType::Binary => self.read_binary()?,
            ElementType::Undefined => {
                return Err(Error::malformed(
                    self.current_path(),
                    "undefined element carries no value",
                ))
            }
            ElementType::ObjectId => Scalar::ObjectId(self.read_object_id()?),
            ElementType::Bool => Scalar::Bool(self.read_u8("reading boolean")? != 0),
            ElementType::DateTime => Scalar::DateTime(self.read_i64("reading datetime")?),
            ElementType::Null => Scalar::Null,
            ElementType::Regex => {
                let pattern = self.read_cstring("reading regex pattern")?;
                let options = self.read_cstring("reading regex options")?;
                for c in options.chars() {
                    // i/m/s/u map to flags, l/x are accepted and inert
                    if !matches!(c, 'i' | 'm' | 's' | 'u' | 'l' | 'x') {
                        return Err(Error::malformed(
                            self.current_path(),
                            format!("invalid regex option '{}'", c),
                        ));
                    }
                }
                Scalar::Regex { pattern, options }
            }
            ElementType::DbPointer => Scalar::DbPointer {
                namespace: self.read_string("reading pointer namespace")?,
                id: self.read_object_id()?,
            },
            ElementType::JavaScript => Scalar::JavaScript(self.read_string("reading code")?),
            ElementType::Symbol => Scalar::Symbol(self.read_string("reading symbol")?),
            ElementType::JavaScriptWithScope => self.read_code_with_scope()?,
            ElementType::Int32 => Scalar::Int32(self.read_i32("reading int32")?),
            ElementType::Timestamp => {
                let increment = self.read_u32("reading timestamp increment")?;
                let time = self.read_u32("reading timestamp time")?;
                Scalar::Timestamp { time, increment }
            }
            ElementType::Int64 => Scalar::Int64(self.read_i64("reading int64")?),
            ElementType::MaxKey => Scalar::MaxKey,
            ElementType::MinKey => Scalar::MinKey,
        };
        Ok(Token::Value(scalar))
    }

    fn read_binary(&mut self) -> Result<Scalar> {
        let len = self.read_i32("reading binary length")?;
        if len < 0 {
            return Err(Error::malformed(
                self.current_path(),
                format!("invalid binary length {}", len),
            ));
        }
        let subtype = self.read_u8("reading binary subtype")?;
        let bytes = if subtype == SUBTYPE_BINARY_OLD {
            // old subtype nests a second length ahead of the payload
            let inner = self.read_i32("reading binary inner length")?;
            if inner != len - 4 {
                return Err(Error::malformed(
                    self.current_path(),
                    format!(
                        "binary subtype 0x02 inner length {} disagrees with outer {}",
                        inner, len
                    ),
                ));
            }
            self.read_bytes(inner as usize, "reading binary payload")?
        } else {
            self.read_bytes(len as usize, "reading binary payload")?
        };
        Ok(Scalar::Binary { subtype, bytes })
    }

    fn read_code_with_scope(&mut self) -> Result<Scalar> {
        // total length covers itself, the code string, and the scope
        self.read_i32("reading code-with-scope length")?;
        let code = self.read_string("reading code")?;
        let scope_len = self.read_i32("reading scope length")?;
        if scope_len < 5 {
            return Err(Error::malformed(
                self.current_path(),
                format!("invalid scope document length {}", scope_len),
            ));
        }
        let body = self.read_bytes(scope_len as usize - 4, "reading scope")?;
        let mut scope = Vec::with_capacity(scope_len as usize);
        scope.extend_from_slice(&scope_len.to_le_bytes());
        scope.extend_from_slice(&body);
        Ok(Scalar::JavaScriptWithScope { code, scope })
    }

    fn push_frame(&mut self, array: bool, len: i32) -> Result<()> {
        if len < 5 {
            return Err(Error::malformed(
                self.current_path(),
                format!("container length {} too small", len),
            ));
        }
        if len as usize > MAX_DOC_SIZE {
            return Err(Error::malformed(
                self.current_path(),
                format!("container length {} exceeds maximum {}", len, MAX_DOC_SIZE),
            ));
        }
        let end = self.pos - 4 + len as u64;
        if let Some(parent) = self.frames.last() {
            if end > parent.end {
                return Err(Error::malformed(
                    self.current_path(),
                    format!(
                        "container length {} exceeds the enclosing document's remaining bytes",
                        len
                    ),
                ));
            }
        }
        if self.frames.len() >= MAX_DEPTH {
            return Err(Error::malformed(self.current_path(), "depth limit exceeded"));
        }
        self.frames.push(Frame {
            array,
            end,
            field: None,
        });
        Ok(())
    }

    fn check_bounds(&self, n: u64, step: &str) -> Result<()> {
        if let Some(frame) = self.frames.last() {
            if self.pos + n > frame.end {
                return Err(Error::malformed(
                    self.current_path(),
                    format!("element extends past its container while {}", step),
                ));
            }
        }
        Ok(())
    }

    fn truncated(&self, step: &str) -> Error {
        Error::malformed(
            self.current_path(),
            format!("unexpected end of input while {}", step),
        )
    }

    fn read_u8(&mut self, step: &str) -> Result<u8> {
        self.check_bounds(1, step)?;
        let input = self.input.as_mut().expect("open input");
        match input.read_u8() {
            Ok(v) => {
                self.pos += 1;
                Ok(v)
            }
            Err(_) => Err(self.truncated(step)),
        }
    }

    fn read_i32(&mut self, step: &str) -> Result<i32> {
        self.check_bounds(4, step)?;
        let input = self.input.as_mut().expect("open input");
        match input.read_i32::<LittleEndian>() {
            Ok(v) => {
                self.pos += 4;
                Ok(v)
            }
            Err(_) => Err(self.truncated(step)),
        }
    }

    fn read_u32(&mut self, step: &str) -> Result<u32> {
        self.check_bounds(4, step)?;
        let input = self.input.as_mut().expect("open input");
        match input.read_u32::<LittleEndian>() {
            Ok(v) => {
                self.pos += 4;
                Ok(v)
            }
            Err(_) => Err(self.truncated(step)),
        }
    }

    fn read_i64(&mut self, step: &str) -> Result<i64> {
        self.check_bounds(8, step)?;
        let input = self.input.as_mut().expect("open input");
        match input.read_i64::<LittleEndian>() {
            Ok(v) => {
                self.pos += 8;
                Ok(v)
            }
            Err(_) => Err(self.truncated(step)),
        }
    }

    fn read_f64(&mut self, step: &str) -> Result<f64> {
        self.check_bounds(8, step)?;
        let input = self.input.as_mut().expect("open input");
        match input.read_f64::<LittleEndian>() {
            Ok(v) => {
                self.pos += 8;
                Ok(v)
            }
            Err(_) => Err(self.truncated(step)),
        }
    }

    fn read_bytes(&mut self, len: usize, step: &str) -> Result<Vec<u8>> {
        self.check_bounds(len as u64, step)?;
        let input = self.input.as_mut().expect("open input");
        let mut buf = vec![0u8; len];
        match input.read_exact(&mut buf) {
            Ok(()) => {
                self.pos += len as u64;
                Ok(buf)
            }
            Err(_) => Err(self.truncated(step)),
        }
    }

    fn read_object_id(&mut self) -> Result<ObjectId> {
        let bytes = self.read_bytes(12, "reading object id")?;
        let mut id = [0u8; 12];
        id.copy_from_slice(&bytes);
        Ok(ObjectId::from_bytes(id))
    }

    /// A NUL-terminated string.
    fn read_cstring(&mut self, step: &str) -> Result<String> {
        let mut bytes = Vec::new();
        loop {
            let b = self.read_u8(step)?;
            if b == 0 {
                break;
            }
            bytes.push(b);
        }
        String::from_utf8(bytes)
            .map_err(|e| Error::malformed(self.current_path(), format!("invalid UTF-8: {}", e)))
    }

    /// A length-prefixed string: int32 byte count (terminator included),
    /// the bytes, then a NUL which must be present as declared.
    fn read_string(&mut self, step: &str) -> Result<String> {
        let len = self.read_i32(step)?;
        if len <= 0 {
            return Err(Error::malformed(
                self.current_path(),
                format!("invalid string length {}", len),
            ));
        }
        let bytes = self.read_bytes(len as usize - 1, step)?;
        let terminator = self.read_u8(step)?;
        if terminator != 0 {
            return Err(Error::malformed(
                self.current_path(),
                "string not terminated as declared",
            ));
        }
        String::from_utf8(bytes)
            .map_err(|e| Error::malformed(self.current_path(), format!("invalid UTF-8: {}", e)))
    }
}
