use std::sync::Arc;

use image::RgbaImage;
use show_model::EffectKind;

use crate::error::{Error, Result};

/// Axis-aligned region of the canvas, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Shrinks the rect so it lies inside a `width` x `height` canvas.
    fn clamped(self, width: u32, height: u32) -> Self {
        let x = self.x.min(width);
        let y = self.y.min(height);
        Self {
            x,
            y,
            width: self.width.min(width - x),
            height: self.height.min(height - y),
        }
    }
}

/// One sample of a transition: the outgoing slide with parts of the incoming
/// slide laid over it.
#[derive(Debug, Clone)]
pub struct TransitionFrame {
    pub base: Arc<RgbaImage>,
    pub overlay: Arc<RgbaImage>,
    pub regions: Vec<Rect>,
    pub ratio: f64,
}

impl TransitionFrame {
    /// A frame that shows `image` alone.
    pub fn still(image: Arc<RgbaImage>) -> Self {
        let (width, height) = image.dimensions();
        Self {
            base: Arc::clone(&image),
            overlay: image,
            regions: vec![Rect::new(0, 0, width, height)],
            ratio: 1.0,
        }
    }

    pub fn is_final(&self) -> bool {
        self.ratio >= 1.0
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.base.dimensions()
    }

    /// Flattens the frame into a single image.
    ///
    /// Panics if a region reaches outside the canvas; regions produced by
    /// [`TransitionRenderer::render`] are always clamped.
    pub fn composite(&self) -> RgbaImage {
        let (width, height) = self.base.dimensions();
        let mut out = (*self.base).clone();
        let stride = width as usize * 4;
        let dst: &mut [u8] = &mut out;
        let src: &[u8] = &self.overlay;
        for rect in &self.regions {
            assert!(
                rect.x + rect.width <= width && rect.y + rect.height <= height,
                "overlay region {rect:?} exceeds {width}x{height} canvas"
            );
            let row_bytes = rect.width as usize * 4;
            for y in rect.y..rect.y + rect.height {
                let start = y as usize * stride + rect.x as usize * 4;
                dst[start..start + row_bytes].copy_from_slice(&src[start..start + row_bytes]);
            }
        }
        out
    }
}

/// Computes transition frames for a fixed canvas size. Rendering has no
/// side effects and can run on any thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRenderer {
    width: u32,
    height: u32,
}

impl TransitionRenderer {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn canvas(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn render(
        &self,
        previous: &Arc<RgbaImage>,
        next: &Arc<RgbaImage>,
        effect: EffectKind,
        ratio: f64,
    ) -> Result<TransitionFrame> {
        for image in [previous, next] {
            if image.dimensions() != self.canvas() {
                return Err(Error::CanvasMismatch {
                    expected: self.canvas(),
                    actual: image.dimensions(),
                });
            }
        }
        let ratio = if ratio.is_nan() {
            0.0
        } else {
            ratio.clamp(0.0, 1.0)
        };
        Ok(TransitionFrame {
            base: Arc::clone(previous),
            overlay: Arc::clone(next),
            regions: self.regions(effect, ratio),
            ratio,
        })
    }

    /// Parts of the canvas that show the incoming slide at `ratio`.
    pub fn regions(&self, effect: EffectKind, ratio: f64) -> Vec<Rect> {
        let (w, h) = (self.width, self.height);
        let scaled = |extent: u32, factor: f64| (f64::from(extent) * factor).round() as u32;
        let rects = match effect {
            EffectKind::WipeLeft => vec![Rect::new(
                scaled(w, 1.0 - ratio),
                0,
                scaled(w, ratio),
                h,
            )],
            EffectKind::WipeRight => vec![Rect::new(0, 0, scaled(w, ratio), h)],
            EffectKind::WipeUp => vec![Rect::new(
                0,
                scaled(h, 1.0 - ratio),
                w,
                scaled(h, ratio),
            )],
            EffectKind::WipeDown => vec![Rect::new(0, 0, w, scaled(h, ratio))],
            EffectKind::Cross => {
                let cw = scaled(w, ratio / 2.0).min(w);
                let ch = scaled(h, ratio / 2.0).min(h);
                vec![
                    Rect::new(0, 0, cw, ch),
                    Rect::new(w - cw, 0, cw, ch),
                    Rect::new(0, h - ch, cw, ch),
                    Rect::new(w - cw, h - ch, cw, ch),
                ]
            }
            EffectKind::None if ratio >= 1.0 => vec![Rect::new(0, 0, w, h)],
            EffectKind::None => Vec::new(),
        };
        rects
            .into_iter()
            .map(|rect| rect.clamped(w, h))
            .filter(|rect| !rect.is_empty())
            .collect()
    }
}
