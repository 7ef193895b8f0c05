//! Aspect-ratio canvas planning and transparent-padded compositing.
//!
//! The padded PNG produced here is the input of the expansion call: every
//! pixel outside the drawn source keeps alpha = 0 so the model can tell
//! "real" pixels from the area it has to fill.

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageOutputFormat, RgbaImage};
use std::io::Cursor;
use thiserror::Error;

/// Longest canvas side used when nothing else is configured.
pub const DEFAULT_MAX_DIMENSION: u32 = 1024;

/// Largest canvas side a rendering surface is allocated for.
pub const MAX_CANVAS_DIMENSION: u32 = 8192;

#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("Failed to load source image: {0}")]
    SourceImageLoad(String),

    #[error("Rendering surface unavailable for a {width}x{height} canvas")]
    SurfaceUnavailable { width: u32, height: u32 },

    #[error("Maximum canvas dimension must be positive")]
    InvalidMaxDimension,

    #[error("Failed to encode PNG: {0}")]
    Encode(#[from] image::ImageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AspectRatio {
    #[default]
    Square,
    Landscape,
    Portrait,
    Standard,
    StandardPortrait,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Square,
        AspectRatio::Landscape,
        AspectRatio::Portrait,
        AspectRatio::Standard,
        AspectRatio::StandardPortrait,
    ];

    /// Width and height terms of the ratio.
    pub fn ratio(self) -> (u32, u32) {
        match self {
            AspectRatio::Square => (1, 1),
            AspectRatio::Landscape => (16, 9),
            AspectRatio::Portrait => (9, 16),
            AspectRatio::Standard => (4, 3),
            AspectRatio::StandardPortrait => (3, 4),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Standard => "4:3",
            AspectRatio::StandardPortrait => "3:4",
        }
    }

    /// Canvas size whose longer side is exactly `max_dimension`.
    pub fn canvas_size(self, max_dimension: u32) -> (u32, u32) {
        let (w, h) = self.ratio();
        let max = max_dimension as f64;
        if w >= h {
            (max_dimension, (max * h as f64 / w as f64).round() as u32)
        } else {
            ((max * w as f64 / h as f64).round() as u32, max_dimension)
        }
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for AspectRatio {
    type Err = String;

    /// Accepts the labels shown in the UI, e.g. `16:9`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AspectRatio::ALL
            .into_iter()
            .find(|ratio| ratio.label() == s.trim())
            .ok_or_else(|| format!("unknown aspect ratio '{}'", s))
    }
}

/// Geometry of one compositing request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasPlan {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub scale: f64,
    pub draw_x: f64,
    pub draw_y: f64,
    pub draw_width: f64,
    pub draw_height: f64,
}

impl CanvasPlan {
    pub fn new(
        source_width: u32,
        source_height: u32,
        aspect_ratio: AspectRatio,
        max_dimension: u32,
    ) -> Result<Self, ComposeError> {
        if max_dimension == 0 {
            return Err(ComposeError::InvalidMaxDimension);
        }
        if source_width == 0 || source_height == 0 {
            return Err(ComposeError::SourceImageLoad(format!(
                "source has no pixels ({}x{})",
                source_width, source_height
            )));
        }

        let (canvas_width, canvas_height) = aspect_ratio.canvas_size(max_dimension);
        let scale = f64::min(
            canvas_width as f64 / source_width as f64,
            canvas_height as f64 / source_height as f64,
        );
        let draw_width = source_width as f64 * scale;
        let draw_height = source_height as f64 * scale;

        Ok(Self {
            canvas_width,
            canvas_height,
            scale,
            draw_x: (canvas_width as f64 - draw_width) / 2.0,
            draw_y: (canvas_height as f64 - draw_height) / 2.0,
            draw_width,
            draw_height,
        })
    }

    /// Integer placement `(x, y, width, height)` used for rasterization.
    /// Always at least one pixel and never outside the canvas.
    pub fn pixel_rect(&self) -> (u32, u32, u32, u32) {
        let width = (self.draw_width.round() as u32).clamp(1, self.canvas_width);
        let height = (self.draw_height.round() as u32).clamp(1, self.canvas_height);
        let x = (self.draw_x.round() as u32).min(self.canvas_width - width);
        let y = (self.draw_y.round() as u32).min(self.canvas_height - height);
        (x, y, width, height)
    }
}

/// A padded canvas ready to be sent for expansion.
#[derive(Debug, Clone)]
pub struct ComposedImage {
    pub plan: CanvasPlan,
    pub png: Vec<u8>,
}

/// Scales `source` into a transparent canvas of the requested aspect ratio.
pub fn compose(
    source: &DynamicImage,
    aspect_ratio: AspectRatio,
    max_dimension: u32,
) -> Result<(CanvasPlan, RgbaImage), ComposeError> {
    let plan = CanvasPlan::new(source.width(), source.height(), aspect_ratio, max_dimension)?;
    let mut canvas = transparent_canvas(plan.canvas_width, plan.canvas_height)?;

    let (x, y, width, height) = plan.pixel_rect();
    let scaled = if (width, height) == (source.width(), source.height()) {
        source.to_rgba8()
    } else {
        source.resize_exact(width, height, FilterType::Lanczos3).to_rgba8()
    };

    // replace, not overlay: source alpha is copied untouched
    imageops::replace(&mut canvas, &scaled, x as i64, y as i64);

    log::debug!(
        "Composed {}x{} source into {}x{} canvas ({}) at ({}, {}) scale {:.4}",
        source.width(),
        source.height(),
        plan.canvas_width,
        plan.canvas_height,
        aspect_ratio,
        x,
        y,
        plan.scale
    );

    Ok((plan, canvas))
}

/// Decodes `bytes`, composes it and encodes the canvas as RGBA PNG.
pub fn compose_png(
    bytes: &[u8],
    aspect_ratio: AspectRatio,
    max_dimension: u32,
) -> Result<ComposedImage, ComposeError> {
    let source = load_source(bytes)?;
    let (plan, canvas) = compose(&source, aspect_ratio, max_dimension)?;
    let png = encode_png(canvas)?;
    Ok(ComposedImage { plan, png })
}

pub fn load_source(bytes: &[u8]) -> Result<DynamicImage, ComposeError> {
    if bytes.is_empty() {
        return Err(ComposeError::SourceImageLoad("image data is empty".to_string()));
    }
    image::load_from_memory(bytes).map_err(|e| ComposeError::SourceImageLoad(e.to_string()))
}

pub fn encode_png(canvas: RgbaImage) -> Result<Vec<u8>, ComposeError> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(canvas).write_to(&mut buffer, ImageOutputFormat::Png)?;
    Ok(buffer.into_inner())
}

fn transparent_canvas(width: u32, height: u32) -> Result<RgbaImage, ComposeError> {
    let unavailable = ComposeError::SurfaceUnavailable { width, height };
    if width > MAX_CANVAS_DIMENSION || height > MAX_CANVAS_DIMENSION {
        return Err(unavailable);
    }
    let Some(len) = (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(4))
    else {
        return Err(unavailable);
    };

    let mut pixels = Vec::new();
    if let Err(e) = pixels.try_reserve_exact(len) {
        log::error!("❌ Cannot allocate {}x{} canvas: {}", width, height, e);
        return Err(unavailable);
    }
    pixels.resize(len, 0);
    RgbaImage::from_raw(width, height, pixels).ok_or(unavailable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba};

    fn solid(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([200, 10, 10, 255])))
    }

    #[test]
    fn test_oversized_canvas_is_an_error() {
        let err = compose(&solid(2, 2), AspectRatio::Square, 400_000).unwrap_err();
        assert!(matches!(
            err,
            ComposeError::SurfaceUnavailable {
                width: 400_000,
                height: 400_000
            }
        ));

        let err = transparent_canvas(u32::MAX, u32::MAX).unwrap_err();
        assert!(matches!(err, ComposeError::SurfaceUnavailable { .. }));

        let canvas = transparent_canvas(MAX_CANVAS_DIMENSION, 16).unwrap();
        assert_eq!(canvas.dimensions(), (MAX_CANVAS_DIMENSION, 16));
    }

    #[test]
    fn test_parse_aspect_ratio_labels() {
        assert_eq!("16:9".parse::<AspectRatio>().unwrap(), AspectRatio::Landscape);
        assert_eq!(" 3:4 ".parse::<AspectRatio>().unwrap(), AspectRatio::StandardPortrait);
        assert!("2:1".parse::<AspectRatio>().is_err());
    }

    #[test]
    fn test_canvas_longer_side_is_max_dimension() {
        for ratio in AspectRatio::ALL {
            for max in [1u32, 7, 512, 1000, 1024, 2048] {
                let (w, h) = ratio.canvas_size(max);
                let (rw, rh) = ratio.ratio();
                assert_eq!(w.max(h), max, "{} at {}", ratio, max);
                let expected =
                    (max as f64 * rw.min(rh) as f64 / rw.max(rh) as f64).round() as u32;
                assert_eq!(w.min(h), expected, "{} at {}", ratio, max);
            }
        }
    }

    #[test]
    fn test_canvas_sizes_at_1024() {
        assert_eq!(AspectRatio::Square.canvas_size(1024), (1024, 1024));
        assert_eq!(AspectRatio::Landscape.canvas_size(1024), (1024, 576));
        assert_eq!(AspectRatio::Portrait.canvas_size(1024), (576, 1024));
        assert_eq!(AspectRatio::Standard.canvas_size(1024), (1024, 768));
        assert_eq!(AspectRatio::StandardPortrait.canvas_size(1024), (768, 1024));
    }

    #[test]
    fn test_square_source_into_landscape() {
        let plan = CanvasPlan::new(800, 800, AspectRatio::Landscape, 1024).unwrap();
        assert_eq!((plan.canvas_width, plan.canvas_height), (1024, 576));
        assert!((plan.scale - 0.72).abs() < 1e-9);
        assert!((plan.draw_width - 576.0).abs() < 1e-9);
        assert!((plan.draw_height - 576.0).abs() < 1e-9);
        assert!((plan.draw_x - 224.0).abs() < 1e-9);
        assert!(plan.draw_y.abs() < 1e-9);
        assert_eq!(plan.pixel_rect(), (224, 0, 576, 576));
    }

    #[test]
    fn test_small_source_is_upscaled() {
        let plan = CanvasPlan::new(100, 50, AspectRatio::Square, 1024).unwrap();
        assert!((plan.scale - 10.24).abs() < 1e-9);
        assert!((plan.draw_width - 1024.0).abs() < 1e-9);
        assert!((plan.draw_y - 256.0).abs() < 1e-9);
    }

    #[test]
    fn test_plan_is_contained_and_centered() {
        let sources = [(1, 1), (3000, 200), (200, 3000), (1920, 1080), (333, 777)];
        for ratio in AspectRatio::ALL {
            for (sw, sh) in sources {
                let plan = CanvasPlan::new(sw, sh, ratio, 1024).unwrap();
                let expected = f64::min(
                    plan.canvas_width as f64 / sw as f64,
                    plan.canvas_height as f64 / sh as f64,
                );
                assert!((plan.scale - expected).abs() < 1e-12);
                assert!(plan.draw_x >= -1e-9 && plan.draw_y >= -1e-9);
                assert!(plan.draw_x + plan.draw_width <= plan.canvas_width as f64 + 1e-9);
                assert!(plan.draw_y + plan.draw_height <= plan.canvas_height as f64 + 1e-9);
                assert!(
                    (plan.draw_x - (plan.canvas_width as f64 - plan.draw_width) / 2.0).abs()
                        < 1e-9
                );

                let (x, y, w, h) = plan.pixel_rect();
                assert!(x + w <= plan.canvas_width && y + h <= plan.canvas_height);
            }
        }
    }

    #[test]
    fn test_compose_pads_with_transparency() {
        let (plan, canvas) = compose(&solid(800, 800), AspectRatio::Landscape, 1024).unwrap();
        assert_eq!(canvas.dimensions(), (1024, 576));
        assert_eq!(plan.pixel_rect(), (224, 0, 576, 576));

        assert_eq!(canvas.get_pixel(0, 0)[3], 0);
        assert_eq!(canvas.get_pixel(223, 300)[3], 0);
        assert_eq!(canvas.get_pixel(800, 575)[3], 0);
        assert_eq!(canvas.get_pixel(1023, 575)[3], 0);
        assert_eq!(canvas.get_pixel(224, 0)[3], 255);
        assert_eq!(canvas.get_pixel(512, 288)[3], 255);
        assert_eq!(canvas.get_pixel(799, 575)[3], 255);
    }

    #[test]
    fn test_compose_is_deterministic() {
        let source = solid(640, 480);
        let (plan_a, canvas_a) = compose(&source, AspectRatio::Portrait, 512).unwrap();
        let (plan_b, canvas_b) = compose(&source, AspectRatio::Portrait, 512).unwrap();
        assert_eq!(plan_a, plan_b);
        assert_eq!(canvas_a.as_raw(), canvas_b.as_raw());
    }

    #[test]
    fn test_compose_png_keeps_alpha_channel() {
        let mut source = Cursor::new(Vec::new());
        solid(60, 30).write_to(&mut source, ImageOutputFormat::Png).unwrap();

        let composed = compose_png(source.get_ref(), AspectRatio::Square, 64).unwrap();
        let decoded = image::load_from_memory(&composed.png).unwrap();
        assert_eq!(decoded.dimensions(), (64, 64));
        assert!(decoded.color().has_alpha());
        assert_eq!(decoded.get_pixel(0, 0)[3], 0);
        assert_eq!(decoded.get_pixel(32, 32)[3], 255);
    }

    #[test]
    fn test_undecodable_source_fails() {
        let err = compose_png(b"not an image", AspectRatio::Square, 1024).unwrap_err();
        assert!(matches!(err, ComposeError::SourceImageLoad(_)));

        let err = compose_png(&[], AspectRatio::Square, 1024).unwrap_err();
        assert!(matches!(err, ComposeError::SourceImageLoad(_)));
    }

    #[test]
    fn test_zero_max_dimension_is_rejected() {
        let err = CanvasPlan::new(10, 10, AspectRatio::Square, 0).unwrap_err();
        assert!(matches!(err, ComposeError::InvalidMaxDimension));
    }
}
