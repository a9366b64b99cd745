//! The tile renderer: a time range of samples in, one bitmap out.
//!
//! The pipeline only ever sees [`TileRenderer`]; [`StftRenderer`] is the
//! default implementation used by the render worker.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bitmap::{BitmapBudget, TileBitmap};
use crate::dsp::fft::FrameAnalyzer;
use crate::palette::{magnitude_to_level, Palette};

/// Everything needed to render one tile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileGenerationParams {
    pub tile_index: usize,
    pub start_time: f64,
    pub end_time: f64,
    /// Target pixel width, one of the LOD ladder widths.
    pub width: u32,
    pub height: u32,
    pub gain: f32,
    pub palette_id: String,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no audio has been initialised")]
    NoAudio,
    #[error("invalid tile size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
    #[error("empty time range {start}s..{end}s")]
    EmptyRange { start: f64, end: f64 },
    #[error("fft failed: {0}")]
    Fft(String),
}

/// Worker-side state a render reads from.
pub struct RenderInput<'a> {
    pub samples: &'a [f32],
    pub sample_rate: u32,
    pub palette: &'a Palette,
}

pub trait TileRenderer: Send + Sync {
    fn render(
        &self,
        input: &RenderInput<'_>,
        params: &TileGenerationParams,
        budget: &BitmapBudget,
    ) -> Result<TileBitmap, RenderError>;
}

/// Hann-windowed STFT renderer: one analysis frame per output column,
/// centred on the column's time, magnitudes mapped through the palette on an
/// absolute dB scale.
#[derive(Clone, Debug)]
pub struct StftRenderer {
    pub fft_size: usize,
}

impl Default for StftRenderer {
    fn default() -> Self {
        Self { fft_size: 1024 }
    }
}

impl TileRenderer for StftRenderer {
    fn render(
        &self,
        input: &RenderInput<'_>,
        params: &TileGenerationParams,
        budget: &BitmapBudget,
    ) -> Result<TileBitmap, RenderError> {
        if input.sample_rate == 0 {
            return Err(RenderError::NoAudio);
        }
        if params.width == 0 || params.height == 0 {
            return Err(RenderError::InvalidSize {
                width: params.width,
                height: params.height,
            });
        }
        if !(params.end_time > params.start_time) {
            return Err(RenderError::EmptyRange {
                start: params.start_time,
                end: params.end_time,
            });
        }

        let sr = input.sample_rate as f64;
        let start_sample = params.start_time * sr;
        let span = (params.end_time - params.start_time) * sr;
        let (w, h) = (params.width as usize, params.height as usize);

        let mut analyzer = FrameAnalyzer::new(self.fft_size);
        let reference = analyzer.reference_magnitude();
        let bins = analyzer.bin_count();
        let half = (self.fft_size / 2) as i64;

        // Row 0 = highest frequency
        let row_bins: Vec<usize> = (0..h)
            .map(|y| ((h - 1 - y) * (bins - 1)) / (h - 1).max(1))
            .collect();

        let mut pixels = vec![0u8; w * h * 4];
        let mut mags = Vec::with_capacity(bins);
        for x in 0..w {
            let centre = start_sample + (x as f64 + 0.5) * span / w as f64;
            analyzer
                .magnitudes_at(input.samples, centre.round() as i64 - half, &mut mags)
                .map_err(|e| RenderError::Fft(format!("{e:?}")))?;
            for (y, &bin) in row_bins.iter().enumerate() {
                let level = magnitude_to_level(mags[bin], reference, params.gain);
                let idx = (y * w + x) * 4;
                pixels[idx..idx + 4].copy_from_slice(&input.palette.lookup(level));
            }
        }

        Ok(budget.allocate(params.width, params.height, pixels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(width: u32, height: u32) -> TileGenerationParams {
        TileGenerationParams {
            tile_index: 0,
            start_time: 0.0,
            end_time: 0.5,
            width,
            height,
            gain: 1.0,
            palette_id: "grey".into(),
        }
    }

    fn tone(freq: f32, sample_rate: u32, secs: f32) -> Vec<f32> {
        let n = (sample_rate as f32 * secs) as usize;
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_renders_requested_size() {
        let samples = tone(1000.0, 8000, 0.5);
        let palette = Palette::greyscale();
        let budget = BitmapBudget::new();
        let input = RenderInput { samples: &samples, sample_rate: 8000, palette: &palette };
        let bmp = StftRenderer { fft_size: 256 }.render(&input, &params(64, 32), &budget).unwrap();
        assert_eq!((bmp.width(), bmp.height()), (64, 32));
        assert_eq!(bmp.pixels().len(), 64 * 32 * 4);
        assert_eq!(budget.live(), 1);
    }

    #[test]
    fn test_tone_row_is_brightest() {
        // 1 kHz at 8 kHz sample rate sits a quarter of the way up the spectrum
        let samples = tone(1000.0, 8000, 0.5);
        let palette = Palette::greyscale();
        let budget = BitmapBudget::new();
        let input = RenderInput { samples: &samples, sample_rate: 8000, palette: &palette };
        let bmp = StftRenderer { fft_size: 256 }.render(&input, &params(16, 65), &budget).unwrap();

        let x = 8usize;
        let brightest_row = (0..65usize)
            .max_by_key(|&y| bmp.pixels()[(y * 16 + x) * 4])
            .unwrap();
        // 65 rows over 129 bins: bin 32 (1 kHz) -> row 64 - 16 = 48
        assert!((brightest_row as i64 - 48).abs() <= 1, "row {brightest_row}");
    }

    #[test]
    fn test_rejects_bad_requests() {
        let palette = Palette::greyscale();
        let budget = BitmapBudget::new();
        let renderer = StftRenderer::default();

        let none = RenderInput { samples: &[], sample_rate: 0, palette: &palette };
        assert!(matches!(renderer.render(&none, &params(8, 8), &budget), Err(RenderError::NoAudio)));

        let samples = vec![0.0f32; 100];
        let input = RenderInput { samples: &samples, sample_rate: 100, palette: &palette };
        assert!(matches!(
            renderer.render(&input, &params(0, 8), &budget),
            Err(RenderError::InvalidSize { .. })
        ));

        let mut empty = params(8, 8);
        empty.end_time = empty.start_time;
        assert!(matches!(
            renderer.render(&input, &empty, &budget),
            Err(RenderError::EmptyRange { .. })
        ));
        assert_eq!(budget.live(), 0);
    }

    #[test]
    fn test_silence_past_end_is_palette_floor() {
        let samples = vec![0.0f32; 10];
        let mut palette_bytes = Palette::greyscale().to_bytes();
        palette_bytes[0..4].copy_from_slice(&[1, 2, 3, 255]);
        let palette = Palette::from_bytes(&palette_bytes).unwrap();
        let budget = BitmapBudget::new();
        let input = RenderInput { samples: &samples, sample_rate: 100, palette: &palette };
        let bmp = StftRenderer { fft_size: 32 }.render(&input, &params(4, 4), &budget).unwrap();
        assert!(bmp.pixels().chunks_exact(4).all(|p| p == [1, 2, 3, 255]));
    }
}
