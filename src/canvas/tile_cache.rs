//! Tile scheduling for the spectrogram view.
//!
//! The timeline is cut into fixed-duration tiles (`tile_duration_s`, 5 s by
//! default). For the current viewport the scheduler works out which tiles
//! are visible (plus a prefetch margin), picks a level of detail from the
//! LOD ladder, and asks the render worker for any tile whose cached entry is
//! stale. Bitmaps arrive asynchronously; each arrival bumps the tile
//! revision so the next [`TileScheduler::poll`] re-lays the visible tiles.
//!
//! LOD choice: the smallest ladder width that is at least the on-screen
//! tile width, so a tile is never stretched beyond its rendered resolution.
//! A wider cached tile always satisfies a narrower requirement, so zooming
//! out never triggers regeneration.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::ops::Range;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::executor::LocalPool;
use futures::task::LocalSpawnExt;
use serde::Serialize;
use spectile_core::{AudioBuffer, BitmapBudget, BitmapId, TileBitmap, TileGenerationParams, TileRenderer};

use crate::canvas::lru::LruCache;
use crate::config::SpectrogramConfig;
use crate::error::TileError;
use crate::state::SharedViewport;
use crate::worker::WorkerClient;

/// Barrier timeout used by [`TileScheduler::request_tiles`] callers that have
/// no better bound.
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(10);

// ── Keys and entries ─────────────────────────────────────────────────────────

/// Cache key: one slot per tile index, whatever its LOD.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TileKey(pub usize);

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tile-{}", self.0)
    }
}

/// A cached render product and the parameters it was rendered with.
#[derive(Debug)]
pub struct TileEntry {
    pub bitmap: TileBitmap,
    pub width: u32,
    pub height: u32,
    pub gain: f32,
    pub palette_id: String,
}

/// Identity of an in-flight request: two requests with the same
/// fingerprint would produce the same bitmap.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    tile_index: usize,
    width: u32,
    height: u32,
    gain_bits: u32,
    palette_id: String,
}

impl Fingerprint {
    pub fn of(params: &TileGenerationParams) -> Self {
        Self {
            tile_index: params.tile_index,
            width: params.width,
            height: params.height,
            gain_bits: params.gain.to_bits(),
            palette_id: params.palette_id.clone(),
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-w{}-h{}-g{}-p{}",
            self.tile_index,
            self.width,
            self.height,
            f32::from_bits(self.gain_bits),
            self.palette_id
        )
    }
}

/// Where one tile goes on screen this pass.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VisibleTile {
    pub key: TileKey,
    /// Left edge in content pixels (subtract scroll for screen position).
    pub left: f64,
    /// On-screen width and height.
    pub width: f64,
    pub height: f64,
    /// Resolution the tile is being rendered at.
    pub canvas_width: u32,
    pub canvas_height: u32,
    /// Bitmap cached for this tile when the pass ran, possibly a lower LOD
    /// than `canvas_width`. Read it through [`TileScheduler::borrow_bitmap`].
    pub bitmap: Option<BitmapId>,
}

/// Metadata for a tile returned by [`TileScheduler::request_tiles`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TileSummary {
    pub tile_index: usize,
    pub bitmap: BitmapId,
    pub width: u32,
    pub height: u32,
    pub gain: f32,
    pub palette_id: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub requests_issued: u64,
    pub requests_failed: u64,
    /// Arrivals dropped because they were from replaced audio or would
    /// have downgraded a wider cached tile.
    pub arrivals_discarded: u64,
    pub cached_tiles: usize,
    pub in_flight: usize,
}

// ── Pure layout helpers ──────────────────────────────────────────────────────

/// Smallest ladder width `>= display_width`, or the largest if none is.
pub fn select_lod_width(display_width: f64, ladder: &[u32]) -> u32 {
    ladder
        .iter()
        .copied()
        .find(|&w| w as f64 >= display_width)
        .or_else(|| ladder.last().copied())
        .unwrap_or(0)
}

/// Tile indices to lay out: those intersecting
/// `[scroll_left, scroll_left + container_width)`, widened by `margin` on
/// each side and clamped to the audio. Empty for a degenerate view.
pub fn visible_range(
    duration: f64,
    zoom: f64,
    scroll_left: f64,
    container_width: f64,
    tile_duration_s: f64,
    margin: usize,
) -> Range<usize> {
    let tile_px = tile_duration_s * zoom;
    if !(duration > 0.0 && tile_px > 0.0 && container_width > 0.0) {
        return 0..0;
    }
    let total_tiles = (duration / tile_duration_s).ceil() as i64;
    let view_end = scroll_left + container_width;

    let first_visible = (scroll_left / tile_px).floor() as i64;
    let last_visible = ((view_end / tile_px).ceil() as i64 - 1).max(first_visible);

    let start = (first_visible - margin as i64).clamp(0, total_tiles);
    let end = (last_visible + margin as i64 + 1).clamp(0, total_tiles);
    if start >= end {
        return 0..0;
    }
    start as usize..end as usize
}

/// Shrink `range` to at most `capacity` tiles so everything laid out can
/// stay cached at once. Prefetch margin goes first, from whichever side has
/// more of it; if the on-screen tiles alone exceed capacity the right end
/// is cut.
pub fn fit_to_capacity(range: Range<usize>, on_screen: Range<usize>, capacity: usize) -> Range<usize> {
    let mut range = range;
    while range.len() > capacity {
        let left_margin = on_screen.start.saturating_sub(range.start);
        let right_margin = range.end.saturating_sub(on_screen.end);
        if left_margin > right_margin {
            range.start += 1;
        } else {
            range.end -= 1;
        }
    }
    range
}

/// Whether a cached entry fails to satisfy a request and must be
/// regenerated. A wider entry satisfies a narrower request.
pub fn is_stale(entry: Option<&TileEntry>, params: &TileGenerationParams) -> bool {
    match entry {
        None => true,
        Some(e) => {
            e.width < params.width
                || e.height != params.height
                || e.gain != params.gain
                || e.palette_id != params.palette_id
        }
    }
}

// ── Shared store ─────────────────────────────────────────────────────────────

struct TileStore {
    cache: LruCache<TileKey, TileEntry>,
    in_flight: HashSet<Fingerprint>,
    /// Bumped whenever the audio (and with it every tile) is replaced.
    generation: u64,
    /// Bumped on every tile arrival that lands in the cache.
    tile_revision: u64,
    stats: SchedulerStats,
}

impl TileStore {
    fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(capacity, |key: &TileKey, entry: TileEntry| {
                log::trace!("{key}: releasing {}px {}", entry.width, entry.bitmap.id());
                entry.bitmap.release();
            }),
            in_flight: HashSet::new(),
            generation: 0,
            tile_revision: 0,
            stats: SchedulerStats::default(),
        }
    }

    fn reset(&mut self) {
        self.generation += 1;
        self.cache.clear();
        self.in_flight.clear();
        self.tile_revision += 1;
    }

    fn complete(
        &mut self,
        generation: u64,
        fingerprint: &Fingerprint,
        params: TileGenerationParams,
        result: Result<TileBitmap, TileError>,
    ) {
        let key = TileKey(params.tile_index);
        if generation != self.generation {
            if let Ok(bitmap) = result {
                log::debug!("{key}: arrival for replaced audio, releasing");
                self.stats.arrivals_discarded += 1;
                bitmap.release();
            }
            return;
        }
        self.in_flight.remove(fingerprint);

        match result {
            Ok(bitmap) => {
                if let Some(existing) = self.cache.peek(&key) {
                    let downgrade = existing.width > params.width
                        && existing.height == params.height
                        && existing.gain == params.gain
                        && existing.palette_id == params.palette_id;
                    if downgrade {
                        log::debug!("{key}: keeping {}px over late {}px arrival", existing.width, params.width);
                        self.stats.arrivals_discarded += 1;
                        bitmap.release();
                        return;
                    }
                }
                log::trace!("{key}: cached at {}x{}", params.width, params.height);
                self.cache.set(
                    key,
                    TileEntry {
                        bitmap,
                        width: params.width,
                        height: params.height,
                        gain: params.gain,
                        palette_id: params.palette_id,
                    },
                );
                self.tile_revision += 1;
            }
            Err(TileError::Cancelled) => log::debug!("{key}: request cancelled"),
            Err(e) => {
                log::warn!("{key}: {e}");
                self.stats.requests_failed += 1;
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ChangeStamp {
    view: u64,
    tiles: u64,
    generation: u64,
}

// ── Scheduler ────────────────────────────────────────────────────────────────

/// Decides which tiles to show and which to (re)generate.
///
/// Single-threaded: it lives with the view on the UI thread. Requests are
/// awaited on a local executor that runs whenever the host pumps the
/// scheduler, so completions never race the layout pass.
pub struct TileScheduler {
    ctx: SharedViewport,
    config: SpectrogramConfig,
    renderer: Option<Arc<dyn TileRenderer>>,
    budget: BitmapBudget,
    client: Option<WorkerClient>,
    store: Rc<RefCell<TileStore>>,
    pool: LocalPool,
    visible: Vec<VisibleTile>,
    last_stamp: Option<ChangeStamp>,
    palette_sent: Option<Arc<[u8]>>,
    audio_loaded: bool,
    capacity_warned: bool,
}

impl TileScheduler {
    /// `renderer = None` models a host without worker support: layout still
    /// runs but no tile is ever generated.
    pub fn new(
        ctx: SharedViewport,
        config: &SpectrogramConfig,
        renderer: Option<Arc<dyn TileRenderer>>,
    ) -> Self {
        let budget = BitmapBudget::new();
        let client = renderer
            .as_ref()
            .and_then(|r| WorkerClient::spawn(Arc::clone(r), budget.clone()));
        if client.is_none() {
            log::info!("spectrogram running without a render worker");
        }
        Self {
            ctx,
            config: config.clone(),
            renderer,
            budget,
            client,
            store: Rc::new(RefCell::new(TileStore::new(config.cache_capacity))),
            pool: LocalPool::new(),
            visible: Vec::new(),
            last_stamp: None,
            palette_sent: None,
            audio_loaded: false,
            capacity_warned: false,
        }
    }

    pub fn has_worker(&self) -> bool {
        self.client.as_ref().is_some_and(WorkerClient::is_alive)
    }

    /// Replace the audio. Clears the cache, drops every pending request
    /// together with the worker that owned it, and hands a fresh copy of
    /// the first channel to a new worker.
    pub fn load_audio(&mut self, buffer: Option<&AudioBuffer>) {
        let unused_worker = !self.audio_loaded
            && self.client.as_ref().is_some_and(|c| c.is_alive() && c.pending_len() == 0);
        if !unused_worker {
            if let Some(mut old) = self.client.take() {
                old.terminate();
            }
        }
        self.store.borrow_mut().reset();
        self.pool.run_until_stalled();
        self.palette_sent = None;
        self.audio_loaded = buffer.is_some();

        let Some(buffer) = buffer else { return };
        if self.client.is_none() {
            self.client = self
                .renderer
                .as_ref()
                .and_then(|r| WorkerClient::spawn(Arc::clone(r), self.budget.clone()));
        }
        if let Some(client) = &self.client {
            client.init_audio(buffer.channel_copy(0), buffer.sample_rate);
        }
        self.sync_palette();
    }

    /// Push the context's palette to the worker if it changed since the
    /// last push.
    fn sync_palette(&mut self) {
        let palette = self.ctx.palette();
        if palette.is_empty() {
            return;
        }
        if self.palette_sent.as_ref().is_some_and(|p| Arc::ptr_eq(p, &palette)) {
            return;
        }
        if let Some(client) = &self.client {
            client.set_palette(&palette);
            self.palette_sent = Some(palette);
        }
    }

    /// Switch palette: publish it on the context and push it to the worker
    /// before any request that carries the new id goes out.
    pub fn set_palette(&mut self, bytes: impl Into<Arc<[u8]>>, palette_id: impl Into<String>) {
        self.ctx.set_palette(bytes, palette_id);
        self.sync_palette();
    }

    /// Generation parameters for tile `index` under the current viewport
    /// and rendering settings.
    pub fn params_for(&self, index: usize) -> TileGenerationParams {
        let tile_s = self.config.tile_duration_s;
        let tile_px = tile_s * self.ctx.zoom();
        TileGenerationParams {
            tile_index: index,
            start_time: index as f64 * tile_s,
            end_time: index as f64 * tile_s + tile_s,
            width: select_lod_width(tile_px, &self.config.lod_widths),
            height: self.ctx.render_height(),
            gain: self.ctx.gain(),
            palette_id: self.ctx.palette_id(),
        }
    }

    /// Issue a generation request unless the cached entry already satisfies
    /// `params` or an identical request is in flight. Returns whether a
    /// request went out.
    pub fn request_tile_if_needed(&mut self, params: TileGenerationParams) -> bool {
        if !self.audio_loaded {
            return false;
        }
        let Some(client) = self.client.as_mut() else {
            return false;
        };

        let key = TileKey(params.tile_index);
        let fingerprint = Fingerprint::of(&params);
        let generation = {
            let mut store = self.store.borrow_mut();
            if !is_stale(store.cache.get(&key), &params) || store.in_flight.contains(&fingerprint) {
                return false;
            }
            store.in_flight.insert(fingerprint.clone());
            store.stats.requests_issued += 1;
            store.generation
        };

        log::debug!("{key}: requesting {fingerprint}");
        let reply = client.get_tile(params.clone());
        let store = Rc::clone(&self.store);
        let task_fingerprint = fingerprint.clone();
        let task = async move {
            let result = reply.await;
            store.borrow_mut().complete(generation, &task_fingerprint, params, result);
        };
        if let Err(e) = self.pool.spawner().spawn_local(task) {
            log::error!("{key}: could not schedule completion: {e:?}");
            self.store.borrow_mut().in_flight.remove(&fingerprint);
            return false;
        }
        true
    }

    /// Recompute the visible tile list, issuing requests for stale tiles.
    pub fn update_visible_tiles(&mut self) -> &[VisibleTile] {
        self.sync_palette();
        self.visible.clear();

        let duration = self.ctx.duration();
        let zoom = self.ctx.zoom();
        let scroll_left = self.ctx.scroll_left();
        let container_width = self.ctx.container_width();
        let tile_s = self.config.tile_duration_s;
        let range = visible_range(duration, zoom, scroll_left, container_width, tile_s, self.config.prefetch_margin);
        if range.is_empty() {
            return &self.visible;
        }

        // More tiles than the cache holds would evict each other forever
        let capacity = self.store.borrow().cache.capacity();
        let range = if range.len() > capacity {
            if !self.capacity_warned {
                log::warn!(
                    "{} tiles in view with prefetch, cache holds {capacity}; dropping prefetch and far tiles",
                    range.len()
                );
                self.capacity_warned = true;
            }
            let on_screen = visible_range(duration, zoom, scroll_left, container_width, tile_s, 0);
            fit_to_capacity(range, on_screen, capacity)
        } else {
            range
        };

        let tile_px = self.config.tile_duration_s * zoom;
        let display_height = self.ctx.display_height();
        let mut tiles = Vec::with_capacity(range.len());
        for index in range {
            let params = self.params_for(index);
            let (canvas_width, canvas_height) = (params.width, params.height);
            self.request_tile_if_needed(params);

            let key = TileKey(index);
            let bitmap = self.store.borrow_mut().cache.get(&key).map(|e| e.bitmap.id());
            tiles.push(VisibleTile {
                key,
                left: index as f64 * tile_px,
                width: tile_px,
                height: display_height,
                canvas_width,
                canvas_height,
                bitmap,
            });
        }
        self.visible = tiles;
        &self.visible
    }

    /// Run completions, then recompute the layout if anything it depends on
    /// changed since the last pass. Returns whether a pass ran.
    pub fn poll(&mut self) -> bool {
        self.pool.run_until_stalled();
        let stamp = {
            let store = self.store.borrow();
            ChangeStamp {
                view: self.ctx.revision(),
                tiles: store.tile_revision,
                generation: store.generation,
            }
        };
        if self.last_stamp == Some(stamp) {
            return false;
        }
        self.last_stamp = Some(stamp);
        self.update_visible_tiles();
        true
    }

    /// Dispatch whatever the worker has answered, then [`poll`](Self::poll).
    pub fn pump(&mut self) -> bool {
        if let Some(client) = self.client.as_mut() {
            client.dispatch_responses();
        }
        self.poll()
    }

    /// Block until no request is in flight or `timeout` passes. Returns
    /// whether everything settled.
    pub fn wait_for_tiles(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.pump();
            if self.store.borrow().in_flight.is_empty() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let Some(client) = self.client.as_mut() else {
                return false;
            };
            client.wait_for_responses(deadline - now);
        }
    }

    /// Run pending completions without touching the layout.
    pub fn run_until_stalled(&mut self) {
        self.pool.run_until_stalled();
    }

    /// Make sure the given tiles are cached at the current parameters and
    /// return their metadata in input order. Used by export paths that need
    /// whole tiles, not whatever happens to be on screen.
    pub fn request_tiles(&mut self, indices: &[usize], timeout: Duration) -> Result<Vec<TileSummary>, TileError> {
        let capacity = self.store.borrow().cache.capacity();
        if indices.len() > capacity {
            return Err(TileError::BatchTooLarge { requested: indices.len(), capacity });
        }
        if !self.has_worker() {
            return Err(TileError::WorkerUnavailable);
        }

        let wanted: Vec<TileGenerationParams> = indices.iter().map(|&i| self.params_for(i)).collect();
        for params in &wanted {
            self.request_tile_if_needed(params.clone());
        }

        let fingerprints: Vec<Fingerprint> = wanted.iter().map(Fingerprint::of).collect();
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(client) = self.client.as_mut() {
                client.dispatch_responses();
            }
            self.pool.run_until_stalled();
            let waiting = {
                let store = self.store.borrow();
                fingerprints.iter().filter(|f| store.in_flight.contains(f)).count()
            };
            if waiting == 0 {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(TileError::Timeout(waiting));
            }
            let Some(client) = self.client.as_mut() else {
                return Err(TileError::WorkerUnavailable);
            };
            client.wait_for_responses(deadline - now);
        }

        let store = self.store.borrow();
        wanted
            .iter()
            .map(|params| match store.cache.peek(&TileKey(params.tile_index)) {
                Some(entry) if !is_stale(Some(entry), params) => Ok(TileSummary {
                    tile_index: params.tile_index,
                    bitmap: entry.bitmap.id(),
                    width: entry.width,
                    height: entry.height,
                    gain: entry.gain,
                    palette_id: entry.palette_id.clone(),
                }),
                _ => Err(TileError::Missing(params.tile_index)),
            })
            .collect()
    }

    /// Tiles laid out by the most recent pass.
    pub fn visible_tiles(&self) -> &[VisibleTile] {
        &self.visible
    }

    /// Read the bitmap a placement refers to, if it is still the one cached.
    pub fn borrow_bitmap<R>(&self, tile: &VisibleTile, f: impl FnOnce(&TileBitmap) -> R) -> Option<R> {
        let id = tile.bitmap?;
        let store = self.store.borrow();
        let entry = store.cache.peek(&tile.key)?;
        if entry.bitmap.id() != id {
            return None;
        }
        Some(f(&entry.bitmap))
    }

    /// Revision bumped by every tile that lands in the cache.
    pub fn tile_revision(&self) -> u64 {
        self.store.borrow().tile_revision
    }

    pub fn stats(&self) -> SchedulerStats {
        let store = self.store.borrow();
        SchedulerStats {
            cached_tiles: store.cache.len(),
            in_flight: store.in_flight.len(),
            ..store.stats
        }
    }

    /// Bitmaps alive anywhere: cached, in transit, or held by a caller.
    pub fn live_bitmaps(&self) -> usize {
        self.budget.live()
    }

    /// Tear down: stop the worker, release every cached bitmap.
    pub fn shutdown(&mut self) {
        if let Some(mut client) = self.client.take() {
            client.terminate();
        }
        self.store.borrow_mut().reset();
        self.pool.run_until_stalled();
        self.visible.clear();
        self.audio_loaded = false;
    }
}

impl Drop for TileScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
