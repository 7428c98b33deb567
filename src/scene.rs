use std::sync::Arc;

use crate::bitmap::Bitmap;
use crate::blur::gaussian_blur;
use crate::composite::draw_over;
use crate::error::RefocusResult;

/// Depth falloff normalization constant.
const SIGMA: f64 = 1.0 / (std::f64::consts::PI * 0.16);

/// One image plane tagged with a normalized depth.
///
/// Depth 0 is nearest, 1 farthest; values clamp on construction. The image is
/// shared and read-only once attached. Two layers are equal when they have the
/// same depth and the same image allocation, so a scene can reject duplicate
/// inserts by identity.
#[derive(Clone, Debug)]
pub struct Layer {
    depth: f32,
    image: Arc<Bitmap>,
}

impl Layer {
    pub fn new(depth: f32, image: Arc<Bitmap>) -> Self {
        Self {
            depth: depth.clamp(0.0, 1.0),
            image,
        }
    }

    pub fn depth(&self) -> f32 {
        self.depth
    }

    pub fn image(&self) -> &Arc<Bitmap> {
        &self.image
    }
}

impl PartialEq for Layer {
    fn eq(&self, other: &Self) -> bool {
        self.depth == other.depth && Arc::ptr_eq(&self.image, &other.image)
    }
}

/// An ordered, duplicate-free collection of depth-tagged layers on a fixed
/// canvas. Layers are only ever added; rendering never mutates the scene.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    width: u32,
    height: u32,
    layers: Vec<Layer>,
}

impl Scene {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            layers: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Adds a layer; a layer already present (same depth and image identity)
    /// is ignored.
    pub fn add(&mut self, layer: Layer) {
        if !self.layers.contains(&layer) {
            self.layers.push(layer);
        }
    }

    /// Composites the scene at the given focal distance.
    ///
    /// All scalar inputs clamp to [0, 1]; `falloff` is additionally scaled by
    /// 30. Layers draw back to front (depth descending, stable for ties), each
    /// centered on the canvas and blurred by
    /// `round(blur_amount * (1 - distr(depth)) * 20)` when that radius is
    /// positive. Returns a fresh bitmap; an empty scene renders transparent.
    #[tracing::instrument(skip(self))]
    pub fn render(
        &self,
        focal_distance: f32,
        falloff: f32,
        blur_amount: f32,
    ) -> RefocusResult<Bitmap> {
        let blur_amount = blur_amount.clamp(0.0, 1.0);
        let focal_distance = focal_distance.clamp(0.0, 1.0);
        let falloff = falloff.clamp(0.0, 1.0) * 30.0;

        let distr = falloff_distribution(focal_distance, falloff);
        let mut canvas = Bitmap::new(self.width, self.height)?;

        let mut ordered: Vec<&Layer> = self.layers.iter().collect();
        ordered.sort_by(|a, b| b.depth.total_cmp(&a.depth));

        for layer in ordered {
            let image = layer.image().as_ref();
            let radius =
                (f64::from(blur_amount) * (1.0 - distr(layer.depth())) * 20.0).round() as u32;
            let x_offset = (self.width as i32 - image.width() as i32) / 2;
            let y_offset = (self.height as i32 - image.height() as i32) / 2;
            tracing::trace!(depth = layer.depth(), radius, "compositing layer");

            if radius > 0 {
                let blurred = gaussian_blur(image, radius)?;
                draw_over(&mut canvas, &blurred, x_offset, y_offset);
            } else {
                draw_over(&mut canvas, image, x_offset, y_offset);
            }
        }

        Ok(canvas)
    }
}

/// A bell curve over depth, peaked at `focal_distance`, whose width shrinks as
/// `falloff` grows.
fn falloff_distribution(focal_distance: f32, falloff: f32) -> impl Fn(f32) -> f64 {
    let focal = f64::from(focal_distance);
    let falloff = f64::from(falloff);
    move |z: f32| {
        let d = std::f64::consts::PI * falloff * (f64::from(z) - focal);
        SIGMA * (-d * d / 2.0).exp() / 2.0
    }
}
