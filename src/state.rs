//! Per-session viewport context shared by the controller, the scheduler and
//! the drawing layer.
//!
//! One instance per mounted view, handed to each component as an
//! `Rc<ViewportContext>`. Setters only bump [`ViewportContext::revision`]
//! when a value actually changes, which is what the scheduler polls to decide
//! whether the visible tile list needs recomputing. Pointer position is
//! tracked separately so hover movement does not trigger tile passes.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use crate::config::SpectrogramConfig;

pub type SharedViewport = Rc<ViewportContext>;

pub struct ViewportContext {
    scroll_left: Cell<f64>,
    zoom: Cell<f64>,
    container_width: Cell<f64>,
    mouse_x: Cell<f64>,
    is_hovering: Cell<bool>,
    duration: Cell<f64>,

    gain: Cell<f32>,
    palette: RefCell<Arc<[u8]>>,
    palette_id: RefCell<String>,
    display_height: Cell<f64>,
    render_height: Cell<u32>,

    default_zoom: f64,
    revision: Cell<u64>,
}

impl ViewportContext {
    pub fn new(config: &SpectrogramConfig) -> SharedViewport {
        Rc::new(Self {
            scroll_left: Cell::new(0.0),
            zoom: Cell::new(config.default_zoom),
            container_width: Cell::new(0.0),
            mouse_x: Cell::new(0.0),
            is_hovering: Cell::new(false),
            duration: Cell::new(0.0),
            gain: Cell::new(config.default_gain),
            palette: RefCell::new(Arc::from(Vec::new())),
            palette_id: RefCell::new(String::new()),
            display_height: Cell::new(config.display_height),
            render_height: Cell::new(config.render_height),
            default_zoom: config.default_zoom,
            revision: Cell::new(0),
        })
    }

    fn bump(&self) {
        self.revision.set(self.revision.get().wrapping_add(1));
    }

    fn set_f64(&self, cell: &Cell<f64>, value: f64) {
        if cell.get() != value {
            cell.set(value);
            self.bump();
        }
    }

    /// Changes to anything the tile layout depends on.
    pub fn revision(&self) -> u64 {
        self.revision.get()
    }

    // ── Scroll / zoom / size ─────────────────────────────────────────────

    pub fn scroll_left(&self) -> f64 {
        self.scroll_left.get()
    }

    pub fn set_scroll_left(&self, px: f64) {
        self.set_f64(&self.scroll_left, px);
    }

    /// Pixels per second.
    pub fn zoom(&self) -> f64 {
        self.zoom.get()
    }

    pub fn set_zoom(&self, zoom: f64) {
        self.set_f64(&self.zoom, zoom);
    }

    pub fn pixels_per_second(&self) -> f64 {
        self.zoom()
    }

    pub fn container_width(&self) -> f64 {
        self.container_width.get()
    }

    pub fn set_container_width(&self, px: f64) {
        self.set_f64(&self.container_width, px.max(0.0));
    }

    pub fn duration(&self) -> f64 {
        self.duration.get()
    }

    pub fn set_duration(&self, secs: f64) {
        self.set_f64(&self.duration, secs.max(0.0));
    }

    /// Scroll and zoom back to defaults, as on loading new audio.
    pub fn reset_view(&self) {
        self.set_scroll_left(0.0);
        self.set_zoom(self.default_zoom);
    }

    // ── Pointer ──────────────────────────────────────────────────────────

    pub fn mouse_x(&self) -> f64 {
        self.mouse_x.get()
    }

    pub fn is_hovering(&self) -> bool {
        self.is_hovering.get()
    }

    pub fn set_pointer(&self, x: f64, hovering: bool) {
        self.mouse_x.set(x);
        self.is_hovering.set(hovering);
    }

    // ── Derived ──────────────────────────────────────────────────────────

    pub fn total_content_width(&self) -> f64 {
        self.duration() * self.zoom()
    }

    pub fn max_scroll_left(&self) -> f64 {
        (self.total_content_width() - self.container_width()).max(0.0)
    }

    pub fn view_start_time(&self) -> f64 {
        let zoom = self.zoom();
        if zoom == 0.0 {
            return 0.0;
        }
        self.scroll_left() / zoom
    }

    pub fn view_end_time(&self) -> f64 {
        let zoom = self.zoom();
        if zoom == 0.0 {
            return 0.0;
        }
        (self.scroll_left() + self.container_width()) / zoom
    }

    /// Time under the pointer, clamped to the audio.
    pub fn hover_time(&self) -> f64 {
        let zoom = self.zoom();
        if zoom == 0.0 {
            return 0.0;
        }
        ((self.scroll_left() + self.mouse_x()) / zoom).clamp(0.0, self.duration())
    }

    // ── Rendering parameters ─────────────────────────────────────────────

    pub fn gain(&self) -> f32 {
        self.gain.get()
    }

    pub fn set_gain(&self, gain: f32) {
        if self.gain.get() != gain {
            self.gain.set(gain);
            self.bump();
        }
    }

    pub fn palette(&self) -> Arc<[u8]> {
        Arc::clone(&self.palette.borrow())
    }

    pub fn palette_id(&self) -> String {
        self.palette_id.borrow().clone()
    }

    /// Replace palette bytes and identifier together.
    pub fn set_palette(&self, bytes: impl Into<Arc<[u8]>>, id: impl Into<String>) {
        *self.palette.borrow_mut() = bytes.into();
        *self.palette_id.borrow_mut() = id.into();
        self.bump();
    }

    pub fn display_height(&self) -> f64 {
        self.display_height.get()
    }

    pub fn set_display_height(&self, px: f64) {
        self.set_f64(&self.display_height, px);
    }

    pub fn render_height(&self) -> u32 {
        self.render_height.get()
    }

    pub fn set_render_height(&self, px: u32) {
        if self.render_height.get() != px {
            self.render_height.set(px);
            self.bump();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> SharedViewport {
        ViewportContext::new(&SpectrogramConfig::default())
    }

    #[test]
    fn test_derived_bounds() {
        let ctx = ctx();
        ctx.set_duration(30.0);
        ctx.set_zoom(100.0);
        ctx.set_container_width(800.0);
        ctx.set_scroll_left(250.0);
        assert_eq!(ctx.total_content_width(), 3000.0);
        assert_eq!(ctx.view_start_time(), 2.5);
        assert_eq!(ctx.view_end_time(), 10.5);
        assert_eq!(ctx.max_scroll_left(), 2200.0);
        assert_eq!(ctx.pixels_per_second(), 100.0);
    }

    #[test]
    fn test_zero_zoom_is_empty_view() {
        let ctx = ctx();
        ctx.set_duration(10.0);
        ctx.set_zoom(0.0);
        ctx.set_scroll_left(100.0);
        assert_eq!(ctx.view_start_time(), 0.0);
        assert_eq!(ctx.view_end_time(), 0.0);
        assert_eq!(ctx.hover_time(), 0.0);
        assert_eq!(ctx.total_content_width(), 0.0);
    }

    #[test]
    fn test_hover_time_clamped() {
        let ctx = ctx();
        ctx.set_duration(2.0);
        ctx.set_zoom(100.0);
        ctx.set_pointer(50.0, true);
        assert_eq!(ctx.hover_time(), 0.5);
        ctx.set_pointer(5000.0, true);
        assert_eq!(ctx.hover_time(), 2.0);
        assert!(ctx.is_hovering());
    }

    #[test]
    fn test_revision_only_moves_on_change() {
        let ctx = ctx();
        let r0 = ctx.revision();
        ctx.set_zoom(ctx.zoom());
        ctx.set_pointer(12.0, true);
        assert_eq!(ctx.revision(), r0);
        ctx.set_scroll_left(5.0);
        assert_eq!(ctx.revision(), r0 + 1);
        ctx.set_gain(2.0);
        ctx.set_render_height(512);
        ctx.set_palette(vec![1u8, 2, 3], "fire");
        assert_eq!(ctx.revision(), r0 + 4);
        assert_eq!(ctx.palette_id(), "fire");
        assert_eq!(&ctx.palette()[..], &[1, 2, 3]);
    }

    #[test]
    fn test_reset_view() {
        let ctx = ctx();
        ctx.set_zoom(400.0);
        ctx.set_scroll_left(900.0);
        ctx.reset_view();
        assert_eq!(ctx.zoom(), 100.0);
        assert_eq!(ctx.scroll_left(), 0.0);
    }
}
