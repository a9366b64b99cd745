//! Platform-neutral pieces of the spectrogram tile pipeline.
//!
//! Everything here is free of scheduling concerns: decoded audio, the bitmap
//! resource handed across the worker boundary, palettes, and the tile
//! renderer that turns a time range of samples into one bitmap.

pub mod bitmap;
pub mod dsp;
pub mod palette;
pub mod render;
pub mod types;

pub use bitmap::{BitmapBudget, BitmapId, TileBitmap};
pub use palette::Palette;
pub use render::{RenderError, RenderInput, StftRenderer, TileGenerationParams, TileRenderer};
pub use types::AudioBuffer;
