use crate::document::RawDocument;
use crate::error::StoreError;
use crate::plan::FieldSet;
use crate::value::RefId;

/// Fetches one document by identity from an origin store. Used for
/// on-demand reference resolution; the decoder asks the store to apply the
/// projected field subset server-side so the returned bytes are already
/// trimmed. Implementations own their transport, retry policy, and
/// cancellation; an error here aborts the enclosing decode call.
pub trait StoreClient {
    fn fetch_one(
        &self,
        origin: &str,
        collection: &str,
        id: &RefId,
        fields: Option<&FieldSet>,
    ) -> Result<Option<RawDocument>, StoreError>;
}

impl<S: StoreClient + ?Sized> StoreClient for &S {
    fn fetch_one(
        &self,
        origin: &str,
        collection: &str,
        id: &RefId,
        fields: Option<&FieldSet>,
    ) -> Result<Option<RawDocument>, StoreError> {
        (**self).fetch_one(origin, collection, id, fields)
    }
}
