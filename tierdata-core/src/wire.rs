//! The wire representation entities are converted to and from.
//!
//! The core never inspects entity fields directly — it only ever moves a
//! [`WireObject`] between [`crate::Bindings::to_wire`]/[`crate::Bindings::from_wire`]
//! and whatever collaborator (REST transport, on-device persistence) actually
//! needs the bytes. `serde_json::Value` is used rather than a bespoke type
//! because every collaborator this crate talks to (the REST transport, the
//! durable store) already speaks JSON.

/// Untyped wire representation of an entity, on its way to or from a
/// collaborator (REST transport or persistence engine).
pub type WireObject = serde_json::Value;
