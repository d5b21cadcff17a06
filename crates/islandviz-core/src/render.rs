//! Renderer boundary
//!
//! Drawing belongs to the host UI. The engine hands it one [`RenderFrame`]
//! per tick.

use crate::state::AccentColor;

/// Everything a renderer needs for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderFrame<'a> {
    /// Bar heights as ratios of the total height, bass first
    pub bar_heights: &'a [f32],
    /// Strip opacity in [0, 1]
    pub opacity: f32,
    /// Bar color
    pub accent: AccentColor,
}

impl RenderFrame<'_> {
    /// Height of `bar` in pixels for a strip `total_height` pixels tall
    pub fn height_px(&self, bar: usize, total_height: f32) -> f32 {
        self.bar_heights.get(bar).copied().unwrap_or(0.0) * total_height
    }

    /// Number of bars
    pub fn bar_count(&self) -> usize {
        self.bar_heights.len()
    }
}

/// Something that can draw bars
pub trait Renderer {
    /// Draw one frame
    fn draw(&mut self, frame: &RenderFrame<'_>);
}

impl<F> Renderer for F
where
    F: FnMut(&RenderFrame<'_>),
{
    fn draw(&mut self, frame: &RenderFrame<'_>) {
        self(frame)
    }
}
