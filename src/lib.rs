//! Spectrogram tile pipeline for the lyric timing editor.
//!
//! Audio is rendered to fixed-duration tiles on a dedicated worker thread,
//! cached with bounded LRU eviction, and laid out for whatever the viewport
//! currently shows. Scroll and zoom are continuous, frame-driven state.
//!
//! The pieces, leaf first:
//! - [`canvas::lru`]: bounded cache with a release callback on every eviction.
//! - [`worker`]: the render thread and the request/response client around it.
//! - [`canvas::tile_cache`]: visible-range computation, LOD choice, staleness
//!   and in-flight deduplication.
//! - [`viewport`]: wheel gestures, the damped scroll/zoom animation, frame
//!   scheduling and the height resize handle.
//! - [`state`]: the per-session viewport context the others share.
//! - [`view`]: one mounted spectrogram view tying it all together.

pub mod canvas;
pub mod config;
pub mod error;
pub mod state;
pub mod view;
pub mod viewport;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use canvas::tile_cache::{SchedulerStats, TileScheduler, TileSummary, VisibleTile};
pub use config::SpectrogramConfig;
pub use error::{ConfigError, TileError};
pub use spectile_core::{AudioBuffer, BitmapBudget, StftRenderer, TileBitmap, TileRenderer};
pub use state::{SharedViewport, ViewportContext};
pub use view::SpectrogramView;
pub use viewport::frames::{FrameId, FrameScheduler, ManualFrames};
pub use viewport::interaction::{Animation, ViewportController, WheelInput};
pub use viewport::resize::HeightResizer;
