use crate::config::SpectrogramConfig;
use crate::state::SharedViewport;

#[derive(Clone, Copy, Debug)]
struct Drag {
    start_y: f64,
    start_height: f64,
}

/// Drag handle on the top edge of the spectrogram: dragging up grows it.
pub struct HeightResizer {
    ctx: SharedViewport,
    min_height: f64,
    max_height: f64,
    drag: Option<Drag>,
}

impl HeightResizer {
    pub fn new(ctx: SharedViewport, config: &SpectrogramConfig) -> Self {
        Self {
            ctx,
            min_height: config.min_display_height,
            max_height: config.max_display_height,
            drag: None,
        }
    }

    pub fn height(&self) -> f64 {
        self.ctx.display_height()
    }

    pub fn is_resizing(&self) -> bool {
        self.drag.is_some()
    }

    pub fn pointer_down(&mut self, client_y: f64) {
        self.drag = Some(Drag { start_y: client_y, start_height: self.height() });
    }

    /// Returns the new height while a drag is active.
    pub fn pointer_move(&mut self, client_y: f64) -> Option<f64> {
        let drag = self.drag?;
        let height = (drag.start_height + (drag.start_y - client_y)).clamp(self.min_height, self.max_height);
        self.ctx.set_display_height(height);
        Some(height)
    }

    pub fn pointer_up(&mut self) {
        if self.drag.take().is_some() {
            log::debug!("spectrogram height set to {:.0}px", self.height());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ViewportContext;
    use std::rc::Rc;

    fn resizer() -> (HeightResizer, SharedViewport) {
        let config = SpectrogramConfig::default();
        let ctx = ViewportContext::new(&config);
        (HeightResizer::new(Rc::clone(&ctx), &config), ctx)
    }

    #[test]
    fn test_drag_up_grows() {
        let (mut r, ctx) = resizer();
        r.pointer_down(500.0);
        assert!(r.is_resizing());
        assert_eq!(r.pointer_move(450.0), Some(250.0));
        assert_eq!(r.pointer_move(520.0), Some(180.0));
        r.pointer_up();
        assert!(!r.is_resizing());
        assert_eq!(ctx.display_height(), 180.0);
    }

    #[test]
    fn test_height_clamped() {
        let (mut r, _ctx) = resizer();
        r.pointer_down(500.0);
        assert_eq!(r.pointer_move(-2000.0), Some(800.0));
        assert_eq!(r.pointer_move(2000.0), Some(100.0));
    }

    #[test]
    fn test_move_without_drag_ignored() {
        let (mut r, ctx) = resizer();
        assert_eq!(r.pointer_move(0.0), None);
        r.pointer_up();
        assert_eq!(ctx.display_height(), 200.0);
        assert_eq!(r.height(), 200.0);
    }
}
