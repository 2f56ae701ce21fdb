use std::fmt;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Boxed error reported by a store client while fetching a referenced
/// document. Retry policy, if any, lives behind the client.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug)]
pub enum Error {
    /// Corrupt or truncated bytes: an unrecognized element tag, a container
    /// length that disagrees with its contents, an unterminated string, or a
    /// nesting depth past [`MAX_DEPTH`](crate::MAX_DEPTH). Fatal for the
    /// enclosing decode call; a fixed byte buffer cannot succeed on retry.
    MalformedDocument { path: String, detail: String },
    /// The store client failed while resolving a reference. Fatal for the
    /// enclosing decode call; wraps the client's own error.
    StoreFetch {
        path: String,
        collection: String,
        id: String,
        source: StoreError,
    },
}

impl Error {
    pub(crate) fn malformed(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::MalformedDocument {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Dotted path from the document root to the element being read when the
    /// error occurred. Empty at the root.
    pub fn path(&self) -> &str {
        match self {
            Error::MalformedDocument { path, .. } => path,
            Error::StoreFetch { path, .. } => path,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::MalformedDocument {
                ref path,
                ref detail,
            } => {
                if path.is_empty() {
                    write!(f, "Malformed document: {}", detail)
                } else {
                    write!(f, "Malformed document at [{}]: {}", path, detail)
                }
            }
            Error::StoreFetch {
                ref path,
                ref collection,
                ref id,
                ref source,
            } => write!(
                f,
                "Store fetch failed at [{}] for {}/{}: {}",
                path, collection, id, source
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            Error::StoreFetch { ref source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
