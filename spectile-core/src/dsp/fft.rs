use realfft::{FftError, RealFftPlanner, RealToComplex};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

thread_local! {
    static FFT_PLANNER: RefCell<RealFftPlanner<f32>> = RefCell::new(RealFftPlanner::new());
    static HANN_CACHE: RefCell<HashMap<usize, Arc<[f32]>>> = RefCell::new(HashMap::new());
}

fn hann_window(size: usize) -> Arc<[f32]> {
    HANN_CACHE.with(|cache| {
        cache
            .borrow_mut()
            .entry(size)
            .or_insert_with(|| {
                let denom = (size.max(2) - 1) as f32;
                (0..size)
                    .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / denom).cos()))
                    .collect()
            })
            .clone()
    })
}

/// Reusable Hann-windowed STFT frame analyser for one FFT size.
///
/// Planner and window are cached per thread, so constructing one per tile on
/// the render thread is cheap.
pub struct FrameAnalyzer {
    fft: Arc<dyn RealToComplex<f32>>,
    window: Arc<[f32]>,
    input: Vec<f32>,
    spectrum: Vec<realfft::num_complex::Complex<f32>>,
}

impl FrameAnalyzer {
    pub fn new(fft_size: usize) -> Self {
        let fft = FFT_PLANNER.with(|p| p.borrow_mut().plan_fft_forward(fft_size));
        let input = fft.make_input_vec();
        let spectrum = fft.make_output_vec();
        Self {
            fft,
            window: hann_window(fft_size),
            input,
            spectrum,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.input.len()
    }

    pub fn bin_count(&self) -> usize {
        self.spectrum.len()
    }

    /// Magnitude of a full-scale sinusoid through this window, for absolute
    /// dB scaling.
    pub fn reference_magnitude(&self) -> f32 {
        self.window.iter().sum::<f32>() / 2.0
    }

    /// Analyse the frame starting at sample `start` (may be negative or run
    /// past the end; out-of-range samples read as silence) and write one
    /// magnitude per bin into `out`.
    pub fn magnitudes_at(
        &mut self,
        samples: &[f32],
        start: i64,
        out: &mut Vec<f32>,
    ) -> Result<(), FftError> {
        for (i, (inp, &w)) in self.input.iter_mut().zip(self.window.iter()).enumerate() {
            let pos = start + i as i64;
            let s = if pos >= 0 && (pos as usize) < samples.len() {
                samples[pos as usize]
            } else {
                0.0
            };
            *inp = s * w;
        }
        self.fft.process(&mut self.input, &mut self.spectrum)?;
        out.clear();
        out.extend(self.spectrum.iter().map(|c| c.norm()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                (2.0 * std::f64::consts::PI * freq * t).sin() as f32
            })
            .collect()
    }

    #[test]
    fn test_peak_bin_matches_tone() {
        let sample_rate = 44_100u32;
        let freq = 1000.0f64;
        let samples = sine(freq, sample_rate, 4096);

        let mut analyzer = FrameAnalyzer::new(1024);
        assert_eq!(analyzer.fft_size(), 1024);
        assert_eq!(analyzer.bin_count(), 513);

        let mut mags = Vec::new();
        analyzer.magnitudes_at(&samples, 512, &mut mags).unwrap();
        let peak_bin = mags
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        let freq_resolution = sample_rate as f64 / 1024.0;
        let peak_freq = peak_bin as f64 * freq_resolution;
        assert!(
            (peak_freq - freq).abs() < freq_resolution * 2.0,
            "Peak at {peak_freq} Hz, expected ~{freq} Hz"
        );
    }

    #[test]
    fn test_reference_matches_full_scale_peak() {
        let samples = sine(1000.0, 48_000, 2048);
        let mut analyzer = FrameAnalyzer::new(1024);
        let mut mags = Vec::new();
        analyzer.magnitudes_at(&samples, 512, &mut mags).unwrap();
        let peak = mags.iter().copied().fold(0.0f32, f32::max);
        let reference = analyzer.reference_magnitude();
        // Scalloping loss keeps the peak within a few dB of the reference
        assert!(peak <= reference * 1.05 && peak >= reference * 0.5);
    }

    #[test]
    fn test_out_of_range_frame_is_silent() {
        let samples = vec![1.0f32; 64];
        let mut analyzer = FrameAnalyzer::new(32);
        let mut mags = Vec::new();
        analyzer.magnitudes_at(&samples, 1000, &mut mags).unwrap();
        assert_eq!(mags.len(), 17);
        assert!(mags.iter().all(|&m| m == 0.0));
    }
}
