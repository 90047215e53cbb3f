//! REST-backed remote tier for tierdata.
//!
//! [`ReqwestRemoteSource`] implements [`tierdata_core::Source`] over an
//! ordinary `reqwest::Client`, dispatching through [`tierdata_core::Bindings`]
//! URLs the same way `hitbox-reqwest` dispatches through its `Next` upstream
//! chain — the transport is a thin collaborator, not part of the cache
//! policy. By-id batching (spec'd as a coalescing timer) lives in
//! [`batching`].

mod batching;
mod remote_source;
mod wire;

pub use remote_source::ReqwestRemoteSource;
pub use wire::ListEnvelope;
