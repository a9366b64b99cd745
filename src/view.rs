//! One mounted spectrogram view.
//!
//! Owns the per-session context and the components that share it. The host
//! forwards input and frame callbacks here and calls [`SpectrogramView::pump`]
//! whenever it is woken (at least once per frame) to pick up rendered tiles.

use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use spectile_core::{AudioBuffer, TileBitmap, TileRenderer};

use crate::canvas::tile_cache::{SchedulerStats, TileScheduler, VisibleTile};
use crate::config::SpectrogramConfig;
use crate::state::{SharedViewport, ViewportContext};
use crate::viewport::frames::{FrameId, FrameScheduler};
use crate::viewport::interaction::{ViewportController, WheelInput};
use crate::viewport::resize::HeightResizer;

pub struct SpectrogramView<F: FrameScheduler> {
    ctx: SharedViewport,
    scheduler: TileScheduler,
    controller: ViewportController<F>,
    resizer: HeightResizer,
}

impl<F: FrameScheduler> SpectrogramView<F> {
    /// `renderer = None` mounts a view that lays out tiles but never renders
    /// them, for hosts without a worker thread.
    pub fn mount(
        config: &SpectrogramConfig,
        renderer: Option<Arc<dyn TileRenderer>>,
        frames: F,
        container_width: f64,
    ) -> Self {
        let ctx = ViewportContext::new(config);
        ctx.set_container_width(container_width);
        log::debug!("mounting spectrogram view, {container_width:.0}px wide");
        Self {
            scheduler: TileScheduler::new(Rc::clone(&ctx), config, renderer),
            controller: ViewportController::new(Rc::clone(&ctx), config, frames),
            resizer: HeightResizer::new(Rc::clone(&ctx), config),
            ctx,
        }
    }

    pub fn context(&self) -> &SharedViewport {
        &self.ctx
    }

    pub fn controller(&self) -> &ViewportController<F> {
        &self.controller
    }

    pub fn scheduler(&self) -> &TileScheduler {
        &self.scheduler
    }

    pub fn stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    /// Replace (or with `None`, unload) the audio. Resets scroll and zoom.
    pub fn load_audio(&mut self, buffer: Option<&AudioBuffer>) {
        self.ctx.set_duration(buffer.map_or(0.0, |b| b.duration_secs));
        self.controller.on_audio_changed();
        self.scheduler.load_audio(buffer);
    }

    pub fn set_palette(&mut self, bytes: impl Into<Arc<[u8]>>, palette_id: impl Into<String>) {
        self.scheduler.set_palette(bytes, palette_id);
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.ctx.set_gain(gain);
    }

    pub fn set_container_width(&mut self, px: f64) {
        self.ctx.set_container_width(px);
    }

    pub fn handle_wheel(&mut self, input: &WheelInput) {
        self.ctx.set_pointer(input.pointer_x, true);
        self.controller.handle_wheel(input);
    }

    /// Pointer moved over the view (or anywhere, during a resize drag).
    pub fn pointer_move(&mut self, x: f64, client_y: f64) {
        self.ctx.set_pointer(x, true);
        self.resizer.pointer_move(client_y);
    }

    pub fn pointer_leave(&mut self) {
        self.ctx.set_pointer(self.ctx.mouse_x(), false);
    }

    /// Pointer pressed on the resize handle.
    pub fn pointer_down_on_handle(&mut self, client_y: f64) {
        self.resizer.pointer_down(client_y);
    }

    pub fn pointer_up(&mut self) {
        self.resizer.pointer_up();
    }

    pub fn is_resizing(&self) -> bool {
        self.resizer.is_resizing()
    }

    /// Time under the pointer, if it is over the view.
    pub fn hover_time(&self) -> Option<f64> {
        self.ctx.is_hovering().then(|| self.ctx.hover_time())
    }

    /// Frame callback for the scroll/zoom animation.
    pub fn on_frame(&mut self, id: FrameId) -> bool {
        self.controller.on_frame(id)
    }

    /// Pick up finished tiles and re-lay the view if anything changed.
    pub fn pump(&mut self) -> bool {
        self.scheduler.pump()
    }

    /// Block until every outstanding tile has landed or `timeout` passes.
    pub fn wait_for_tiles(&mut self, timeout: Duration) -> bool {
        self.scheduler.wait_for_tiles(timeout)
    }

    pub fn visible_tiles(&self) -> &[VisibleTile] {
        self.scheduler.visible_tiles()
    }

    pub fn borrow_bitmap<R>(&self, tile: &VisibleTile, f: impl FnOnce(&TileBitmap) -> R) -> Option<R> {
        self.scheduler.borrow_bitmap(tile, f)
    }

    /// Stop animations, the worker and release every bitmap. The view can
    /// be dropped afterwards; dropping without unmounting does the same.
    pub fn unmount(&mut self) {
        log::debug!("unmounting spectrogram view");
        self.controller.unmount();
        self.scheduler.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{tone, SolidRenderer};
    use crate::viewport::frames::ManualFrames;

    const WAIT: Duration = Duration::from_secs(10);

    fn mounted() -> (SpectrogramView<ManualFrames>, ManualFrames) {
        let config = SpectrogramConfig { render_height: 32, ..SpectrogramConfig::default() };
        let frames = ManualFrames::new();
        let view = SpectrogramView::mount(&config, Some(Arc::new(SolidRenderer)), frames.clone(), 800.0);
        (view, frames)
    }

    fn drive(view: &mut SpectrogramView<ManualFrames>, frames: &ManualFrames) {
        while let Some(id) = frames.next_frame() {
            view.on_frame(id);
            view.pump();
        }
        assert!(view.wait_for_tiles(WAIT));
        view.pump();
    }

    #[test]
    fn test_load_and_render_visible_tiles() {
        let (mut view, frames) = mounted();
        view.load_audio(Some(&AudioBuffer::mono(tone(220.0, 1000, 30.0), 1000)));
        drive(&mut view, &frames);

        let tiles = view.visible_tiles().to_vec();
        assert_eq!(tiles.len(), 4);
        assert!(tiles.iter().all(|t| t.bitmap.is_some()));
        assert_eq!(view.borrow_bitmap(&tiles[0], |b| (b.width(), b.height())), Some((512, 32)));
    }

    #[test]
    fn test_zoom_gesture_moves_to_higher_lod() {
        let (mut view, frames) = mounted();
        view.load_audio(Some(&AudioBuffer::mono(vec![0.0; 30_000], 1000)));
        drive(&mut view, &frames);

        for _ in 0..6 {
            view.handle_wheel(&WheelInput { delta_y: -1.0, ctrl_key: true, pointer_x: 400.0, ..WheelInput::default() });
        }
        drive(&mut view, &frames);
        // 100 * 1.15^6 ~ 231 px/s -> 1157 px tiles -> 2048 LOD
        let zoom = view.context().zoom();
        assert!((zoom - 100.0 * 1.15f64.powi(6)).abs() < 1e-6);
        let tiles = view.visible_tiles().to_vec();
        assert!(tiles.iter().all(|t| t.canvas_width == 2048));
        assert!(tiles
            .iter()
            .all(|t| view.borrow_bitmap(t, |b| b.width()) == Some(2048)));
        assert!(view.scheduler().live_bitmaps() <= 70);
    }

    #[test]
    fn test_new_audio_resets_view_and_tiles() {
        let (mut view, frames) = mounted();
        view.load_audio(Some(&AudioBuffer::mono(vec![0.0; 30_000], 1000)));
        view.handle_wheel(&WheelInput { delta_y: 600.0, ..WheelInput::default() });
        drive(&mut view, &frames);
        assert_eq!(view.context().scroll_left(), 600.0);

        view.load_audio(Some(&AudioBuffer::mono(vec![0.0; 8_000], 1000)));
        assert_eq!(view.context().scroll_left(), 0.0);
        assert_eq!(view.context().duration(), 8.0);
        drive(&mut view, &frames);
        assert_eq!(view.visible_tiles().len(), 2);
        assert_eq!(view.stats().cached_tiles, 2);
    }

    #[test]
    fn test_hover_and_resize() {
        let (mut view, _frames) = mounted();
        view.load_audio(Some(&AudioBuffer::mono(vec![0.0; 30_000], 1000)));
        assert_eq!(view.hover_time(), None);
        view.pointer_move(250.0, 0.0);
        assert_eq!(view.hover_time(), Some(2.5));
        view.pointer_leave();
        assert_eq!(view.hover_time(), None);

        view.pointer_down_on_handle(600.0);
        view.pointer_move(10.0, 500.0);
        view.pointer_up();
        assert!(!view.is_resizing());
        assert_eq!(view.context().display_height(), 300.0);
        view.pump();
        assert!(view.visible_tiles().iter().all(|t| t.height == 300.0));
    }

    #[test]
    fn test_unmount_releases_everything() {
        let (mut view, frames) = mounted();
        view.load_audio(Some(&AudioBuffer::mono(vec![0.0; 30_000], 1000)));
        drive(&mut view, &frames);
        view.handle_wheel(&WheelInput { delta_y: 300.0, ..WheelInput::default() });
        assert_eq!(frames.pending_len(), 1);

        view.unmount();
        assert_eq!(frames.pending_len(), 0);
        assert_eq!(view.scheduler().live_bitmaps(), 0);
        assert!(view.visible_tiles().is_empty());
    }

    #[test]
    fn test_degraded_view_still_lays_out() {
        let frames = ManualFrames::new();
        let mut view = SpectrogramView::mount(&SpectrogramConfig::default(), None, frames.clone(), 800.0);
        view.load_audio(Some(&AudioBuffer::mono(vec![0.0; 30_000], 1000)));
        drive(&mut view, &frames);
        assert_eq!(view.visible_tiles().len(), 4);
        assert!(view.visible_tiles().iter().all(|t| t.bitmap.is_none()));
    }
}
