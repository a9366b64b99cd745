//! Tile bitmaps and the ledger that tracks how many are alive.
//!
//! A [`TileBitmap`] stands in for a platform image resource: it is scarce,
//! it is moved (never shared) across the worker boundary, and it must be
//! given back through [`TileBitmap::release`] at the cache eviction, orphan
//! response and teardown sites. Dropping a bitmap also returns it to the
//! ledger so an early-return path can never leak one.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Process-unique identity of a bitmap, used to check that a placement still
/// refers to the bitmap currently cached for its tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BitmapId(u64);

impl fmt::Display for BitmapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bmp#{}", self.0)
    }
}

#[derive(Default)]
struct Ledger {
    next_id: AtomicU64,
    live: AtomicUsize,
    released: AtomicUsize,
}

/// Allocator and live-count ledger for tile bitmaps.
///
/// Cheap to clone; every clone refers to the same ledger.
#[derive(Clone, Default)]
pub struct BitmapBudget {
    ledger: Arc<Ledger>,
}

impl BitmapBudget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an RGBA pixel buffer (`width * height * 4` bytes) as a bitmap.
    pub fn allocate(&self, width: u32, height: u32, pixels: Vec<u8>) -> TileBitmap {
        debug_assert_eq!(pixels.len(), width as usize * height as usize * 4);
        let id = BitmapId(self.ledger.next_id.fetch_add(1, Ordering::Relaxed));
        self.ledger.live.fetch_add(1, Ordering::AcqRel);
        TileBitmap {
            id,
            width,
            height,
            pixels,
            ledger: Arc::clone(&self.ledger),
        }
    }

    /// Bitmaps allocated and not yet released.
    pub fn live(&self) -> usize {
        self.ledger.live.load(Ordering::Acquire)
    }

    /// Total number of releases so far.
    pub fn released(&self) -> usize {
        self.ledger.released.load(Ordering::Acquire)
    }
}

impl fmt::Debug for BitmapBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitmapBudget")
            .field("live", &self.live())
            .field("released", &self.released())
            .finish()
    }
}

/// One rendered tile image (RGBA, row-major, row 0 = highest frequency).
pub struct TileBitmap {
    id: BitmapId,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    ledger: Arc<Ledger>,
}

impl TileBitmap {
    pub fn id(&self) -> BitmapId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Give the resource back. Consuming `self` makes a read after release
    /// impossible.
    pub fn release(self) {
        log::trace!("release {} ({}x{})", self.id, self.width, self.height);
        drop(self);
    }
}

impl Drop for TileBitmap {
    fn drop(&mut self) {
        self.ledger.live.fetch_sub(1, Ordering::AcqRel);
        self.ledger.released.fetch_add(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for TileBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileBitmap")
            .field("id", &self.id)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}
