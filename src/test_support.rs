//! Fakes shared by the unit tests.

use std::f32::consts::TAU;

use spectile_core::{BitmapBudget, RenderError, RenderInput, TileBitmap, TileGenerationParams, TileRenderer};

/// Paints a solid tile in the palette's mid colour; fails for palette id
/// "fail".
pub struct SolidRenderer;

impl TileRenderer for SolidRenderer {
    fn render(
        &self,
        input: &RenderInput<'_>,
        params: &TileGenerationParams,
        budget: &BitmapBudget,
    ) -> Result<TileBitmap, RenderError> {
        if params.palette_id == "fail" {
            return Err(RenderError::InvalidSize { width: params.width, height: params.height });
        }
        let px = input.palette.lookup(128);
        let pixels = px.repeat(params.width as usize * params.height as usize);
        Ok(budget.allocate(params.width, params.height, pixels))
    }
}

pub fn tone(freq: f32, sample_rate: u32, secs: f64) -> Vec<f32> {
    let n = (secs * sample_rate as f64) as usize;
    (0..n).map(|i| (TAU * freq * i as f32 / sample_rate as f32).sin()).collect()
}
