//! Media element abstraction and implementations.
//!
//! The audio engine drives playback exclusively through the [`MediaElement`]
//! trait and observes it exclusively through [`crate::protocol::MediaEvent`]
//! messages on the bus, so tests can substitute a scripted element.

pub mod cpal_element;
pub mod fetch;

use std::path::PathBuf;

/// What the element should play.
#[derive(Debug, Clone)]
pub enum MediaSourceSpec {
    /// Remote URL the element fetches itself (token already embedded).
    Url(String),
    /// Local blob file materialized by a header-authenticated fetch.
    Blob(PathBuf),
}

/// A single playable media element.
///
/// Implementations publish [`crate::protocol::MediaEvent`]s tagged with the
/// generation passed to [`MediaElement::load`]; the engine drops events from
/// superseded loads.
pub trait MediaElement {
    /// Replaces the current source. Any previous playback must stop first.
    fn load(&mut self, source: MediaSourceSpec, generation: u64, start_offset_ms: u64);
    fn play(&mut self);
    fn pause(&mut self);
    /// Stops playback and drops the current source's buffered audio.
    fn stop(&mut self);
    fn seek_ms(&mut self, position_ms: u64);
    fn set_volume(&mut self, volume: f32);
    fn set_muted(&mut self, muted: bool);
}
