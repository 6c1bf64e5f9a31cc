//! Pan/zoom state for the video surface.
//!
//! Pure presentation bookkeeping. The only invariant is that the zoom factor
//! stays within [`MIN_ZOOM`]..=[`MAX_ZOOM`], and that panning is meaningless
//! (and therefore reset) at the minimum zoom.

/// Smallest zoom factor: the frame fits the surface.
pub const MIN_ZOOM: f32 = 1.0;

/// Largest zoom factor.
pub const MAX_ZOOM: f32 = 5.0;

/// Zoom factor and pan offset applied to the rendered frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    scale: f32,
    offset_x: f32,
    offset_y: f32,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            scale: MIN_ZOOM,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }
}

impl ViewTransform {
    /// Apply one transform-gesture sample: multiply the zoom by `zoom` and
    /// shift by `(pan_x, pan_y)`.
    ///
    /// # Example
    ///
    /// ```
    /// use framestep::ViewTransform;
    ///
    /// let mut view = ViewTransform::default();
    /// view.apply_gesture(10.0, 0.0, 8.0);
    /// assert_eq!(view.scale(), 5.0);
    /// view.apply_gesture(10.0, 0.0, 0.01);
    /// assert_eq!(view.scale(), 1.0);
    /// assert_eq!(view.offset(), (0.0, 0.0));
    /// ```
    pub fn apply_gesture(&mut self, pan_x: f32, pan_y: f32, zoom: f32) {
        let zoom = if zoom.is_finite() && zoom > 0.0 { zoom } else { 1.0 };
        self.scale = (self.scale * zoom).clamp(MIN_ZOOM, MAX_ZOOM);
        if self.scale > MIN_ZOOM {
            self.offset_x += pan_x;
            self.offset_y += pan_y;
        } else {
            self.offset_x = 0.0;
            self.offset_y = 0.0;
        }
    }

    /// Back to fit-to-surface.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Current zoom factor.
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Current pan offset in surface pixels.
    pub fn offset(&self) -> (f32, f32) {
        (self.offset_x, self.offset_y)
    }
}
