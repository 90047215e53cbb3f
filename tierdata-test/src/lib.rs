//! Shared fixtures for tierdata's test suites: a mock entity and bindings
//! ([`entity`]) and a scripted in-memory remote [`tierdata_core::Source`]
//! ([`ScriptedRemoteSource`]), mirroring the role `hitbox-test` plays for the
//! teacher's crates.

mod entity;
mod scripted;

pub use entity::{new_widget, widget, LocalOnlyFilter, NameStartsWith, Widget, WidgetBindings};
pub use scripted::{CountersSnapshot, ScriptedRemoteSource};
