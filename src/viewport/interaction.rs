//! Wheel gestures and the damped scroll/zoom animation.
//!
//! Input only moves *targets*. The actual scroll and zoom in the shared
//! context chase those targets one frame at a time, covering `smoothing` of
//! the remaining distance per frame and snapping once within epsilon.
//!
//! Zoom is anchored at the pointer: the time under the cursor when the
//! gesture started stays under the cursor throughout.
//!
//! ```text
//! anchor_time = (scroll_left + pointer_x) / zoom        at gesture start
//! scroll_left = anchor_time * zoom' - pointer_x          every zoom step
//! ```
//!
//! Scrolling and zooming both write `scroll_left`, so only one animation
//! runs at a time; starting either cancels the other.

use crate::config::SpectrogramConfig;
use crate::state::SharedViewport;
use crate::viewport::frames::{FrameId, FrameScheduler};

/// One wheel event, in container coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WheelInput {
    pub delta_x: f64,
    pub delta_y: f64,
    /// Zoom modifier (ctrl, or a trackpad pinch reported as ctrl-wheel).
    pub ctrl_key: bool,
    pub shift_key: bool,
    /// Pointer offset from the container's left edge.
    pub pointer_x: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Animation {
    Idle,
    Scrolling,
    Zooming { anchor_time: f64, anchor_px: f64 },
}

pub struct ViewportController<F: FrameScheduler> {
    ctx: SharedViewport,
    frames: F,
    min_zoom: f64,
    max_zoom: f64,
    default_zoom: f64,
    zoom_sensitivity: f64,
    smoothing: f64,
    scroll_epsilon: f64,
    zoom_epsilon: f64,

    target_scroll_left: f64,
    target_zoom: f64,
    animation: Animation,
    /// Outstanding frame request. Only a callback carrying this id may step
    /// the animation.
    frame: Option<FrameId>,
}

impl<F: FrameScheduler> ViewportController<F> {
    pub fn new(ctx: SharedViewport, config: &SpectrogramConfig, frames: F) -> Self {
        let target_scroll_left = ctx.scroll_left();
        let target_zoom = ctx.zoom();
        Self {
            ctx,
            frames,
            min_zoom: config.min_zoom,
            max_zoom: config.max_zoom,
            default_zoom: config.default_zoom,
            zoom_sensitivity: config.zoom_sensitivity,
            smoothing: config.smoothing,
            scroll_epsilon: config.scroll_epsilon_px,
            zoom_epsilon: config.zoom_epsilon,
            target_scroll_left,
            target_zoom,
            animation: Animation::Idle,
            frame: None,
        }
    }

    pub fn target_zoom(&self) -> f64 {
        self.target_zoom
    }

    pub fn target_scroll_left(&self) -> f64 {
        self.target_scroll_left
    }

    pub fn animation(&self) -> Animation {
        self.animation
    }

    pub fn is_animating(&self) -> bool {
        self.animation != Animation::Idle
    }

    pub fn handle_wheel(&mut self, input: &WheelInput) {
        if input.ctrl_key {
            self.zoom_gesture(input);
        } else {
            self.scroll_gesture(input);
        }
    }

    fn zoom_gesture(&mut self, input: &WheelInput) {
        let zoom = self.ctx.zoom();
        if zoom <= 0.0 || input.delta_y == 0.0 {
            return;
        }
        let anchor_px = input.pointer_x;
        let anchor_time = (self.ctx.scroll_left() + anchor_px) / zoom;

        let target = if input.delta_y < 0.0 {
            self.target_zoom * self.zoom_sensitivity
        } else {
            self.target_zoom / self.zoom_sensitivity
        };
        let target = target.clamp(self.min_zoom, self.max_zoom);
        // An interrupted zoom can leave the target at a bound the view never reached
        if target == self.target_zoom && zoom == target {
            return;
        }
        log::trace!("zoom target {:.2} -> {target:.2} at {anchor_time:.3}s", self.target_zoom);
        self.target_zoom = target;
        self.start(Animation::Zooming { anchor_time, anchor_px });
    }

    fn scroll_gesture(&mut self, input: &WheelInput) {
        let mut delta = if input.delta_x.abs() > input.delta_y.abs() {
            input.delta_x
        } else {
            input.delta_y
        };
        if input.shift_key && delta == 0.0 {
            delta = input.delta_y;
        }
        let max = self.ctx.max_scroll_left();
        self.target_scroll_left = (self.target_scroll_left + delta).clamp(0.0, max);
        self.start(Animation::Scrolling);
    }

    /// Cancel whatever runs, then take the first step right away.
    fn start(&mut self, animation: Animation) {
        self.cancel_animation();
        self.animation = animation;
        self.step();
    }

    /// Frame callback. Returns `false` for a frame this controller no
    /// longer owns (cancelled or superseded), which is then ignored.
    pub fn on_frame(&mut self, id: FrameId) -> bool {
        if self.frame != Some(id) {
            log::trace!("ignoring stale {id}");
            return false;
        }
        self.frame = None;
        self.step();
        true
    }

    fn step(&mut self) {
        match self.animation {
            Animation::Idle => return,
            Animation::Scrolling => self.step_scroll(),
            Animation::Zooming { anchor_time, anchor_px } => self.step_zoom(anchor_time, anchor_px),
        }
        if self.animation != Animation::Idle {
            self.frame = Some(self.frames.request_frame());
        }
    }

    fn step_scroll(&mut self) {
        let current = self.ctx.scroll_left();
        let diff = self.target_scroll_left - current;
        if diff.abs() < self.scroll_epsilon {
            self.ctx.set_scroll_left(self.target_scroll_left);
            self.animation = Animation::Idle;
            return;
        }
        self.ctx.set_scroll_left(current + diff * self.smoothing);
    }

    fn step_zoom(&mut self, anchor_time: f64, anchor_px: f64) {
        let current = self.ctx.zoom();
        let diff = self.target_zoom - current;
        let zoom = if diff.abs() < self.zoom_epsilon {
            self.animation = Animation::Idle;
            self.target_zoom
        } else {
            current + diff * self.smoothing
        };
        self.ctx.set_zoom(zoom);

        let scroll = (anchor_time * zoom - anchor_px).clamp(0.0, self.ctx.max_scroll_left());
        self.ctx.set_scroll_left(scroll);
        self.target_scroll_left = scroll;
    }

    /// Stop any running animation where it is and withdraw its frame.
    pub fn cancel_animation(&mut self) {
        if let Some(id) = self.frame.take() {
            self.frames.cancel_frame(id);
        }
        self.animation = Animation::Idle;
    }

    /// New audio: back to the default view with nothing in motion.
    pub fn on_audio_changed(&mut self) {
        self.cancel_animation();
        self.ctx.reset_view();
        self.target_scroll_left = 0.0;
        self.target_zoom = self.default_zoom;
    }

    pub fn unmount(&mut self) {
        self.cancel_animation();
    }
}

impl<F: FrameScheduler> Drop for ViewportController<F> {
    fn drop(&mut self) {
        self.cancel_animation();
    }
}
