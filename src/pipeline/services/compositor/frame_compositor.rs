use std::sync::Arc;

use image::{imageops, imageops::FilterType, DynamicImage, Rgba, RgbaImage};

use super::{aspect_fit, FeatherMask, Placement};
use crate::common::CanvasSize;
use crate::pipeline::types::{HandState, PalmPosition};

/// An image already scaled and positioned onto a canvas-sized, transparent layer.
struct FittedLayer {
    placement: Placement,
    pixels: RgbaImage,
}

impl FittedLayer {
    fn fit(image: &DynamicImage, canvas: CanvasSize) -> Self {
        let placement = aspect_fit(image.width(), image.height(), canvas);
        let mut pixels = RgbaImage::new(canvas.width, canvas.height);

        if let Some(visible) = VisibleRegion::of(image, &placement, canvas) {
            let cropped = image
                .crop_imm(visible.src_x, visible.src_y, visible.src_width, visible.src_height)
                .to_rgba8();
            let scaled = imageops::resize(
                &cropped,
                visible.width,
                visible.height,
                FilterType::Triangle,
            );
            imageops::replace(&mut pixels, &scaled, visible.x as i64, visible.y as i64);
        }

        tracing::debug!(
            "Fitted {}x{} image to {:?} on {}x{} canvas",
            image.width(),
            image.height(),
            placement,
            canvas.width,
            canvas.height
        );

        Self { placement, pixels }
    }
}

/// The part of a placed image that lands on the canvas, in source and canvas pixels.
#[derive(Debug, PartialEq)]
struct VisibleRegion {
    src_x: u32,
    src_y: u32,
    src_width: u32,
    src_height: u32,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl VisibleRegion {
    fn of(image: &DynamicImage, placement: &Placement, canvas: CanvasSize) -> Option<Self> {
        if image.width() == 0 || image.height() == 0 || placement.width <= 0.0 {
            return None;
        }

        let scale = placement.width / image.width() as f32;
        let (src_x, src_width, x, width) =
            Self::axis(placement.x, scale, image.width(), canvas.width)?;
        let (src_y, src_height, y, height) =
            Self::axis(placement.y, scale, image.height(), canvas.height)?;

        Some(Self {
            src_x,
            src_y,
            src_width,
            src_height,
            x,
            y,
            width,
            height,
        })
    }

    /// Clips one axis of the placement to `[0, canvas_len)` and maps it back to source pixels.
    fn axis(
        offset: f32,
        scale: f32,
        src_len: u32,
        canvas_len: u32,
    ) -> Option<(u32, u32, u32, u32)> {
        let start = offset.max(0.0);
        let end = (offset + src_len as f32 * scale).min(canvas_len as f32);
        if end - start < 0.5 {
            return None;
        }

        let src_start = (((start - offset) / scale).floor().max(0.0) as u32).min(src_len - 1);
        let src_end = (((end - offset) / scale).ceil() as u32).clamp(src_start + 1, src_len);

        let dst_start = (start.round() as u32).min(canvas_len - 1);
        let dst_end = (end.round() as u32).clamp(dst_start + 1, canvas_len);

        Some((src_start, src_end - src_start, dst_start, dst_end - dst_start))
    }
}

/// Draws the background and, when a hand is present, the feathered overlay reveal.
pub struct FrameCompositor {
    canvas: CanvasSize,
    background: Arc<DynamicImage>,
    overlay: Arc<DynamicImage>,
    mask: FeatherMask,
    fitted_background: Option<FittedLayer>,
    fitted_overlay: Option<FittedLayer>,
}

impl FrameCompositor {
    pub fn new(canvas: CanvasSize, background: Arc<DynamicImage>, overlay: Arc<DynamicImage>) -> Self {
        Self {
            canvas,
            background,
            overlay,
            mask: FeatherMask::default(),
            fitted_background: None,
            fitted_overlay: None,
        }
    }

    pub fn with_mask(mut self, mask: FeatherMask) -> Self {
        self.mask = mask;
        self
    }

    pub fn canvas(&self) -> CanvasSize {
        self.canvas
    }

    /// Changes the canvas size, dropping the fitted layers.
    pub fn resize(&mut self, canvas: CanvasSize) {
        if canvas != self.canvas {
            self.canvas = canvas;
            self.fitted_background = None;
            self.fitted_overlay = None;
        }
    }

    pub fn background_placement(&mut self) -> Placement {
        self.background_layer().placement
    }

    pub fn overlay_placement(&mut self) -> Placement {
        self.overlay_layer().placement
    }

    pub fn render(&mut self, state: &HandState) -> RgbaImage {
        let mut frame = RgbaImage::new(self.canvas.width, self.canvas.height);

        imageops::overlay(&mut frame, &self.background_layer().pixels, 0, 0);

        if let HandState::HandPresent(palm) = state {
            let palm = *palm;
            let mask = self.mask;
            let overlay = &self.overlay_layer().pixels;
            reveal(&mut frame, overlay, &palm, &mask);
        }

        frame
    }

    fn background_layer(&mut self) -> &FittedLayer {
        let canvas = self.canvas;
        let background = &self.background;
        self.fitted_background
            .get_or_insert_with(|| FittedLayer::fit(background, canvas))
    }

    fn overlay_layer(&mut self) -> &FittedLayer {
        let canvas = self.canvas;
        let overlay = &self.overlay;
        self.fitted_overlay
            .get_or_insert_with(|| FittedLayer::fit(overlay, canvas))
    }
}

/// Blends `overlay` onto `frame` inside the palm circle, weighted by the mask.
fn reveal(frame: &mut RgbaImage, overlay: &RgbaImage, palm: &PalmPosition, mask: &FeatherMask) {
    if palm.radius <= 0.0 {
        return;
    }

    let (width, height) = frame.dimensions();
    let x0 = (palm.x - palm.radius).floor().max(0.0) as u32;
    let y0 = (palm.y - palm.radius).floor().max(0.0) as u32;
    let x1 = ((palm.x + palm.radius).ceil().max(0.0) as u32).min(width);
    let y1 = ((palm.y + palm.radius).ceil().max(0.0) as u32).min(height);

    for y in y0..y1 {
        for x in x0..x1 {
            let distance = palm.distance_from_center(x as f32 + 0.5, y as f32 + 0.5);
            let coverage = mask.alpha(distance, palm.radius);
            if coverage <= 0.0 {
                continue;
            }
            let src = *overlay.get_pixel(x, y);
            blend_over(frame.get_pixel_mut(x, y), src, coverage);
        }
    }
}

fn blend_over(dst: &mut Rgba<u8>, src: Rgba<u8>, coverage: f32) {
    let src_a = src[3] as f32 / 255.0 * coverage;
    if src_a <= 0.0 {
        return;
    }
    let dst_a = dst[3] as f32 / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);

    for c in 0..3 {
        let s = src[c] as f32;
        let d = dst[c] as f32;
        let value = (s * src_a + d * dst_a * (1.0 - src_a)) / out_a;
        dst[c] = value.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}
