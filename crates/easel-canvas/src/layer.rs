//! Canvas Layers
//!
//! A layer is a canvas-sized ARGB pixel buffer plus the metadata carried
//! in the original protocol: title, opacity, blend mode, visibility,
//! censor and lock flags, and an access tier.

use easel_protocol::{AccessTier, BlendMode, Color, LayerId, LayerImage, Rect};
use serde::{Deserialize, Serialize};

/// A single layer of the canvas
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    /// Stable identifier
    pub id: LayerId,

    /// Display title
    pub title: String,

    /// Opacity, 0 (transparent) to 255 (opaque)
    pub opacity: u8,

    /// Compositing mode
    pub blend: BlendMode,

    /// Hidden from view
    pub hidden: bool,

    /// Censored content flag
    pub censored: bool,

    /// Locked against edits
    pub locked: bool,

    /// Access tier required to edit this layer
    pub tier: AccessTier,

    /// Group this layer belongs to. A parent that no longer exists is
    /// treated as top level.
    pub parent: Option<LayerId>,

    /// ARGB pixels, row-major, `width * height` entries
    pub pixels: Vec<u32>,
}

impl Layer {
    /// Create a new transparent layer sized for a canvas
    #[must_use]
    pub fn new(id: LayerId, title: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id,
            title: title.into(),
            opacity: 255,
            blend: BlendMode::Normal,
            hidden: false,
            censored: false,
            locked: false,
            tier: AccessTier::Everyone,
            parent: None,
            pixels: vec![0; width as usize * height as usize],
        }
    }

    /// Fill the part of `rect` that intersects the canvas with a color.
    /// `width`/`height` are the canvas dimensions.
    pub fn fill_rect(&mut self, width: u32, height: u32, rect: Rect, color: Color) {
        let Some(clamped) = clamp_rect(rect, width, height) else {
            return;
        };
        for y in clamped.y..clamped.y + clamped.h as i32 {
            let row = y as usize * width as usize;
            for x in clamped.x..clamped.x + clamped.w as i32 {
                self.pixels[row + x as usize] = color.0;
            }
        }
    }

    /// Write explicit pixels into `rect`. The source buffer is
    /// `rect`-shaped; parts outside the canvas are skipped.
    pub fn put_pixels(&mut self, width: u32, height: u32, rect: Rect, src: &[u32]) {
        let Some(clamped) = clamp_rect(rect, width, height) else {
            return;
        };
        for cy in 0..clamped.h as i32 {
            let dst_y = (clamped.y + cy) as usize;
            let src_y = (clamped.y + cy - rect.y) as usize;
            for cx in 0..clamped.w as i32 {
                let dst_x = (clamped.x + cx) as usize;
                let src_x = (clamped.x + cx - rect.x) as usize;
                self.pixels[dst_y * width as usize + dst_x] =
                    src[src_y * rect.w as usize + src_x];
            }
        }
    }

    /// Copy out the pixels of the part of `rect` that intersects the
    /// canvas, together with the clamped rectangle they belong to
    #[must_use]
    pub fn region(&self, width: u32, height: u32, rect: Rect) -> Option<(Rect, Vec<u32>)> {
        let clamped = clamp_rect(rect, width, height)?;
        let mut out = Vec::with_capacity(clamped.area());
        for y in clamped.y..clamped.y + clamped.h as i32 {
            let row = y as usize * width as usize;
            for x in clamped.x..clamped.x + clamped.w as i32 {
                out.push(self.pixels[row + x as usize]);
            }
        }
        Some((clamped, out))
    }

    /// Convert to the transportable [`LayerImage`] form
    #[must_use]
    pub fn to_image(&self) -> LayerImage {
        LayerImage {
            id: self.id,
            title: self.title.clone(),
            opacity: self.opacity,
            blend: self.blend,
            hidden: self.hidden,
            censored: self.censored,
            locked: self.locked,
            tier: self.tier,
            parent: self.parent,
            pixels: self.pixels.clone(),
        }
    }

    /// Rebuild a layer from its transportable form
    #[must_use]
    pub fn from_image(image: LayerImage) -> Self {
        Self {
            id: image.id,
            title: image.title,
            opacity: image.opacity,
            blend: image.blend,
            hidden: image.hidden,
            censored: image.censored,
            locked: image.locked,
            tier: image.tier,
            parent: image.parent,
            pixels: image.pixels,
        }
    }
}

/// Intersect a rectangle with the canvas bounds. Returns None when the
/// intersection is empty.
#[must_use]
pub fn clamp_rect(rect: Rect, width: u32, height: u32) -> Option<Rect> {
    let x0 = rect.x.max(0);
    let y0 = rect.y.max(0);
    let x1 = rect.x.saturating_add(rect.w as i32).min(width as i32);
    let y1 = rect.y.saturating_add(rect.h as i32).min(height as i32);
    if x0 >= x1 || y0 >= y1 {
        return None;
    }
    Some(Rect::new(x0, y0, (x1 - x0) as u32, (y1 - y0) as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_layer_is_transparent() {
        let layer = Layer::new(LayerId(1), "Background", 4, 4);
        assert_eq!(layer.pixels.len(), 16);
        assert!(layer.pixels.iter().all(|&p| p == 0));
        assert_eq!(layer.opacity, 255);
    }

    #[test]
    fn test_fill_rect_clamps_to_canvas() {
        let mut layer = Layer::new(LayerId(1), "L", 4, 4);
        layer.fill_rect(4, 4, Rect::new(-2, -2, 4, 4), Color(0xFF00_0000));
        // Only the 2x2 intersection at the origin is painted
        assert_eq!(layer.pixels[0], 0xFF00_0000);
        assert_eq!(layer.pixels[5], 0xFF00_0000);
        assert_eq!(layer.pixels[2], 0);
        assert_eq!(layer.pixels[10], 0);
    }

    #[test]
    fn test_put_and_read_region_round_trip() {
        let mut layer = Layer::new(LayerId(1), "L", 4, 4);
        let rect = Rect::new(1, 1, 2, 2);
        layer.put_pixels(4, 4, rect, &[1, 2, 3, 4]);

        let (clamped, pixels) = layer.region(4, 4, rect).unwrap();
        assert_eq!(clamped, rect);
        assert_eq!(pixels, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_region_outside_canvas_is_none() {
        let layer = Layer::new(LayerId(1), "L", 4, 4);
        assert!(layer.region(4, 4, Rect::new(10, 10, 2, 2)).is_none());
    }

    #[test]
    fn test_layer_image_round_trip() {
        let mut layer = Layer::new(LayerId(5), "Sketch", 2, 2);
        layer.censored = true;
        layer.opacity = 128;
        let restored = Layer::from_image(layer.to_image());
        assert_eq!(restored, layer);
    }
}
