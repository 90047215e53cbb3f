//! Per-entity metadata: id extraction, wire (de)serialization, and URL
//! construction.
//!
//! A [`Bindings`] implementation is the only place an entity type `T` and the
//! generic coordinator machinery meet. Everything else in this crate family —
//! [`crate::Source`], the request cache, the SourceList cascade — is written
//! against `T` only through this trait, the same way the teacher writes its
//! backend machinery against `Cacheable`/`CacheableResponse` rather than any
//! concrete response type.

use crate::error::SourceError;
use crate::wire::WireObject;
use url::Url;

/// Per-entity binding: id extraction, wire (de)serialization, and REST URLs.
///
/// Implementations are expected to be cheap to clone (most are zero-sized or
/// hold an `Arc`'d base URL) since a single `Bindings<T>` instance is shared
/// across every [`crate::Source`] in a `SourceList`.
pub trait Bindings<T>: Send + Sync {
    /// Extracts the entity's id, if it has been assigned one.
    ///
    /// Returns `None` for locally-constructed entities that have not yet
    /// been persisted (and therefore have no server-assigned id).
    fn id_of(&self, item: &T) -> Option<String>;

    /// Deserializes an entity from its wire representation.
    fn from_wire(&self, wire: &WireObject) -> Result<T, SourceError>;

    /// Serializes an entity to its wire representation.
    fn to_wire(&self, item: &T) -> WireObject;

    /// The URL for reading, updating, or deleting a single entity by id.
    fn detail_url(&self, id: &str) -> Url;

    /// The URL for listing or creating entities.
    fn list_url(&self) -> Url;

    /// The URL used to create a new entity. Defaults to [`Bindings::list_url`].
    fn create_url(&self) -> Url {
        self.list_url()
    }

    /// Client-side id generation for entities the server doesn't assign ids
    /// to. Returns `None` by default, meaning the server must assign the id
    /// (the common case for REST backends with server-side primary keys).
    fn assign_id(&self, item: T) -> Option<T> {
        let _ = &item;
        None
    }
}
