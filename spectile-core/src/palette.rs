/// Number of colour stops in a palette.
pub const PALETTE_LEN: usize = 256;

/// Dynamic range mapped onto the palette, in dB below full scale.
const DYNAMIC_RANGE_DB: f32 = 80.0;

/// A 256-entry colour lookup table indexed by intensity level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Palette {
    stops: Vec<[u8; 4]>,
}

impl Default for Palette {
    fn default() -> Self {
        Self::greyscale()
    }
}

impl Palette {
    pub fn greyscale() -> Self {
        Self {
            stops: (0..PALETTE_LEN).map(|i| [i as u8, i as u8, i as u8, 255]).collect(),
        }
    }

    /// Parse palette bytes as pushed by the theming side: 256 RGBA stops
    /// (1024 bytes) or 256 RGB stops (768 bytes). Anything else is rejected.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let stops = match bytes.len() {
            n if n == PALETTE_LEN * 4 => bytes
                .chunks_exact(4)
                .map(|c| [c[0], c[1], c[2], c[3]])
                .collect(),
            n if n == PALETTE_LEN * 3 => bytes
                .chunks_exact(3)
                .map(|c| [c[0], c[1], c[2], 255])
                .collect(),
            _ => return None,
        };
        Some(Self { stops })
    }

    /// RGBA bytes in the layout accepted by [`Palette::from_bytes`].
    pub fn to_bytes(&self) -> Vec<u8> {
        self.stops.iter().flatten().copied().collect()
    }

    pub fn lookup(&self, level: u8) -> [u8; 4] {
        self.stops[level as usize]
    }
}

/// Map a spectral magnitude to a palette level (0-255).
///
/// `reference` is the magnitude of a full-scale sinusoid for the FFT size in
/// use, so tiles rendered independently share one absolute scale. Gain is a
/// linear multiplier applied before the dB conversion.
pub fn magnitude_to_level(mag: f32, reference: f32, gain: f32) -> u8 {
    if reference <= 0.0 || mag <= 0.0 || gain <= 0.0 {
        return 0;
    }
    let db = 20.0 * (mag * gain / reference).log10();
    let db_clamped = db.clamp(-DYNAMIC_RANGE_DB, 0.0);
    ((db_clamped + DYNAMIC_RANGE_DB) / DYNAMIC_RANGE_DB * 255.0) as u8
}
