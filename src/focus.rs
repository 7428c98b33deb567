use rayon::prelude::*;

use crate::bitmap::{Bitmap, Rect};
use crate::convolve::{ConvolutionMode, Kernel, convolve};
use crate::error::{RefocusError, RefocusResult};
use crate::scene::Scene;

/// Gradient statistics accumulated over one candidate's gradient image: a
/// 256-bucket histogram of gray values plus three per-channel sums of squared
/// neighbor differences.
///
/// The derived `average`/`standard_deviation` are computed over the histogram
/// bucket counts themselves, not over per-pixel gray values. That is the
/// established behavior of this metric and is kept as-is.
#[derive(Clone, Debug)]
pub struct Spectrum {
    raw: Vec<f64>,
    r_sum: i64,
    g_sum: i64,
    b_sum: i64,
}

impl Spectrum {
    pub const BUCKETS: usize = 256;

    /// Scans a gradient image. For every pixel, the gray value lands in its
    /// histogram bucket, and the squared channel differences between the
    /// `(x+1 mod W, y)` and `(x, y+1 mod H)` neighbors feed the channel sums
    /// (exactly this wrapped, asymmetric pair).
    pub fn measure(gradient: &Bitmap) -> Self {
        let mut raw = vec![0.0f64; Self::BUCKETS];
        let (mut r_sum, mut g_sum, mut b_sum) = (0i64, 0i64, 0i64);
        let (w, h) = (gradient.width(), gradient.height());

        for y in 0..h {
            for x in 0..w {
                raw[gradient.pixel(x, y).gray() as usize] += 1.0;

                let px1 = gradient.pixel((x + 1) % w, y);
                let px2 = gradient.pixel(x, (y + 1) % h);
                r_sum += square(i32::from(px1.r) - i32::from(px2.r));
                g_sum += square(i32::from(px1.g) - i32::from(px2.g));
                b_sum += square(i32::from(px1.b) - i32::from(px2.b));
            }
        }

        Self {
            raw,
            r_sum,
            g_sum,
            b_sum,
        }
    }

    /// Histogram bucket counts (always 256 entries).
    pub fn raw(&self) -> &[f64] {
        &self.raw
    }

    pub fn channel_sums(&self) -> (i64, i64, i64) {
        (self.r_sum, self.g_sum, self.b_sum)
    }

    /// Sharpness proxy: `sqrt(r_sum + g_sum + b_sum)`. Non-negative; higher
    /// means more local gradient variance.
    pub fn contrast(&self) -> f64 {
        ((self.r_sum + self.g_sum + self.b_sum) as f64).sqrt()
    }

    /// Mean of the histogram bucket counts.
    pub fn average(&self) -> f64 {
        self.raw.iter().sum::<f64>() / self.raw.len() as f64
    }

    /// Standard deviation of the histogram bucket counts.
    pub fn standard_deviation(&self) -> f64 {
        deviation(&self.raw)
    }

    /// Min-max scales the bucket counts into [0, 1]. When every bucket is
    /// equal the denominator gets an epsilon bump, yielding uniform zeros
    /// rather than NaN.
    pub fn normalized(&self) -> Vec<f64> {
        let min = self.raw.iter().copied().fold(f64::INFINITY, f64::min);
        let mut max = self.raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if max == min {
            max += 1.0;
        }
        self.raw.iter().map(|v| (v - min) / (max - min)).collect()
    }

    /// Standard deviation of the normalized bucket counts.
    pub fn normalized_standard_deviation(&self) -> f64 {
        deviation(&self.normalized())
    }
}

fn square(n: i32) -> i64 {
    i64::from(n) * i64::from(n)
}

fn deviation(values: &[f64]) -> f64 {
    let avg = values.iter().sum::<f64>() / values.len() as f64;
    let sum = values.iter().map(|v| (v - avg) * (v - avg)).sum::<f64>();
    (sum / values.len() as f64).sqrt()
}

/// One evaluated focal-distance candidate.
#[derive(Clone, Debug)]
pub struct FocusFrame {
    /// The rendered scene, cropped to the selection.
    pub original: Bitmap,
    /// Gradient magnitude image of `original`.
    pub gradient: Bitmap,
    /// The candidate focal distance.
    pub focal: f32,
    pub spectrum: Spectrum,
}

/// All frames of one sweep plus the selected focal distance.
#[derive(Clone, Debug)]
pub struct FocusResult {
    pub frames: Vec<FocusFrame>,
    pub focal_distance: f32,
}

impl FocusResult {
    /// Serializable summary of the sweep for inspection tooling.
    pub fn report(&self) -> FocusReport {
        FocusReport {
            focal_distance: self.focal_distance,
            candidates: self
                .frames
                .iter()
                .map(|f| FocusCandidate {
                    focal: f.focal,
                    contrast: f.spectrum.contrast(),
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct FocusReport {
    pub focal_distance: f32,
    pub candidates: Vec<FocusCandidate>,
}

#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct FocusCandidate {
    pub focal: f32,
    pub contrast: f64,
}

/// Sweep granularity and threading controls.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct SweepOpts {
    /// Candidate spacing in (0, 1]; the sweep has `ceil(1/step)` candidates.
    pub step: f32,
    /// Evaluate candidates in parallel when `true`.
    pub parallel: bool,
    /// Optional explicit worker thread count for the parallel sweep.
    pub threads: Option<usize>,
}

impl Default for SweepOpts {
    fn default() -> Self {
        Self {
            step: 0.01,
            parallel: true,
            threads: None,
        }
    }
}

/// Sweeps candidate focal distances over a scene and picks the one whose
/// selected region measures sharpest.
#[derive(Clone, Debug)]
pub struct Autofocus {
    scene: Scene,
    region: Option<Rect>,
}

impl Autofocus {
    /// Focus against the whole rendered image.
    pub fn entire_image(scene: Scene) -> Self {
        Self {
            scene,
            region: None,
        }
    }

    /// Focus against a selection rectangle in scene-pixel coordinates. The
    /// rectangle may be unordered or degenerate; it is normalized here, and a
    /// degenerate or fully out-of-bounds selection falls back to the whole
    /// image.
    pub fn region(scene: Scene, region: Rect) -> Self {
        Self {
            scene,
            region: Some(region),
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Runs a sweep with the default options (step 0.01, parallel).
    pub fn focus(&self, falloff: f32, blur_amount: f32) -> RefocusResult<FocusResult> {
        self.focus_with_opts(falloff, blur_amount, &SweepOpts::default())
    }

    /// Renders, crops, and scores `ceil(1/step)` evenly spaced candidates
    /// `f_i = i * step`, then selects the maximum-contrast candidate (ties go
    /// to the earliest in sweep order). Every candidate's frame is retained.
    ///
    /// Candidates only read the shared scene and write private slots, so the
    /// parallel path distributes them over a bounded worker pool; frame order
    /// is identical either way.
    #[tracing::instrument(skip(self, opts))]
    pub fn focus_with_opts(
        &self,
        falloff: f32,
        blur_amount: f32,
        opts: &SweepOpts,
    ) -> RefocusResult<FocusResult> {
        let step = opts.step;
        if !step.is_finite() || step <= 0.0 || step > 1.0 {
            return Err(RefocusError::validation("sweep step must be in (0, 1]"));
        }

        // Computed in f32 so nominal steps like 0.01 divide to a whole count.
        let count = (1.0f32 / step).ceil() as usize;
        let (hkernel, vkernel) = sweep_kernels()?;
        let selection = self.selection();

        let evaluate = |i: usize| -> RefocusResult<FocusFrame> {
            self.evaluate_candidate(step * i as f32, falloff, blur_amount, selection, &hkernel, &vkernel)
        };

        let frames = if opts.parallel {
            let pool = build_thread_pool(opts.threads)?;
            pool.install(|| {
                (0..count)
                    .into_par_iter()
                    .map(evaluate)
                    .collect::<RefocusResult<Vec<_>>>()
            })?
        } else {
            (0..count).map(evaluate).collect::<RefocusResult<Vec<_>>>()?
        };

        let mut best_focal = 0.0f32;
        let mut best_contrast = f64::NEG_INFINITY;
        for frame in &frames {
            let contrast = frame.spectrum.contrast();
            if contrast > best_contrast {
                best_contrast = contrast;
                best_focal = frame.focal;
            }
        }
        tracing::debug!(count, best_focal, best_contrast, "sweep complete");

        Ok(FocusResult {
            frames,
            focal_distance: best_focal,
        })
    }

    fn selection(&self) -> Option<Rect> {
        self.region
            .filter(|r| !r.normalized().is_degenerate())
            .and_then(|r| r.clipped_to(self.scene.width(), self.scene.height()))
    }

    fn evaluate_candidate(
        &self,
        focal: f32,
        falloff: f32,
        blur_amount: f32,
        selection: Option<Rect>,
        hkernel: &Kernel,
        vkernel: &Kernel,
    ) -> RefocusResult<FocusFrame> {
        let rendered = self.scene.render(focal, falloff, blur_amount)?;
        let original = match selection {
            Some(rect) => rendered.crop(rect)?,
            None => rendered,
        };
        let gradient = convolve(&original, hkernel, vkernel, ConvolutionMode::RepeatEdges)?;
        let spectrum = Spectrum::measure(&gradient);
        tracing::trace!(focal, contrast = spectrum.contrast(), "candidate scored");

        Ok(FocusFrame {
            original,
            gradient,
            focal,
            spectrum,
        })
    }
}

/// The fixed gradient kernel pair used to score sharpness.
fn sweep_kernels() -> RefocusResult<(Kernel, Kernel)> {
    let h = Kernel::from_rows(&[&[-1.0, 1.0, -1.0], &[0.0, 0.0, 0.0], &[1.0, -1.0, 1.0]])?;
    let v = Kernel::from_rows(&[&[-1.0, 0.0, 1.0], &[1.0, 0.0, -1.0], &[-1.0, 0.0, 1.0]])?;
    Ok((h, v))
}

fn build_thread_pool(threads: Option<usize>) -> RefocusResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(RefocusError::validation(
            "sweep 'threads' must be >= 1 when set",
        ));
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.unwrap_or(0))
        .build()
        .map_err(|e| RefocusError::evaluation(format!("failed to build sweep thread pool: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::Rgb;

    fn uniform(w: u32, h: u32, px: Rgb) -> Bitmap {
        let mut bmp = Bitmap::new(w, h).unwrap();
        bmp.fill([px.r, px.g, px.b, 255]);
        bmp
    }

    #[test]
    fn histogram_counts_sum_to_pixel_count() {
        let mut bmp = Bitmap::new(4, 3).unwrap();
        bmp.set_pixel(1, 1, Rgb::new(200, 10, 60));
        let spec = Spectrum::measure(&bmp);
        assert_eq!(spec.raw().len(), Spectrum::BUCKETS);
        assert_eq!(spec.raw().iter().sum::<f64>(), 12.0);
    }

    #[test]
    fn uniform_image_has_zero_contrast() {
        let spec = Spectrum::measure(&uniform(5, 5, Rgb::new(77, 77, 77)));
        assert_eq!(spec.contrast(), 0.0);
    }

    #[test]
    fn contrast_is_non_negative() {
        let mut bmp = Bitmap::new(3, 3).unwrap();
        bmp.set_pixel(0, 0, Rgb::new(255, 0, 128));
        let spec = Spectrum::measure(&bmp);
        assert!(spec.contrast() >= 0.0);
    }

    #[test]
    fn average_and_deviation_are_over_bucket_counts() {
        // 2x2 all-black gradient: raw[0] = 4, everything else 0.
        let spec = Spectrum::measure(&uniform(2, 2, Rgb::BLACK));
        let avg = 4.0 / 256.0;
        assert!((spec.average() - avg).abs() < 1e-12);

        let var = ((4.0 - avg).powi(2) + 255.0 * avg * avg) / 256.0;
        assert!((spec.standard_deviation() - var.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn normalized_is_zero_when_all_buckets_equal() {
        // 0x0 image: every bucket stays at zero.
        let spec = Spectrum::measure(&Bitmap::new(0, 0).unwrap());
        let norm = spec.normalized();
        assert!(norm.iter().all(|&v| v == 0.0));
        assert!(!spec.normalized_standard_deviation().is_nan());
    }

    #[test]
    fn normalized_stays_in_unit_range() {
        let mut bmp = Bitmap::new(4, 4).unwrap();
        for y in 0..4 {
            for x in 0..4 {
                bmp.set_pixel(x, y, Rgb::from_gray_f(f64::from(x + y * 4) / 16.0));
            }
        }
        for v in Spectrum::measure(&bmp).normalized() {
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn step_outside_unit_interval_is_rejected() {
        let af = Autofocus::entire_image(Scene::new(2, 2));
        for step in [0.0, -0.1, 1.5, f32::NAN] {
            let opts = SweepOpts {
                step,
                ..SweepOpts::default()
            };
            assert!(af.focus_with_opts(0.5, 0.5, &opts).is_err(), "step {step}");
        }
    }

    #[test]
    fn all_equal_candidates_tie_to_the_first() {
        // An empty scene renders identically at every focal distance.
        let af = Autofocus::entire_image(Scene::new(4, 4));
        let res = af.focus(0.5, 0.5).unwrap();
        assert_eq!(res.focal_distance, 0.0);
    }

    #[test]
    fn degenerate_region_falls_back_to_whole_image() {
        let af = Autofocus::region(Scene::new(4, 4), Rect::new(2, 2, 2, 5));
        assert_eq!(af.selection(), None);
        let af = Autofocus::region(Scene::new(4, 4), Rect::new(3, 2, 1, 0));
        assert_eq!(af.selection(), Some(Rect::new(1, 0, 3, 2)));
    }

    #[test]
    fn fully_out_of_bounds_region_falls_back_to_whole_image() {
        let af = Autofocus::region(Scene::new(4, 4), Rect::new(10, 10, 20, 20));
        assert_eq!(af.selection(), None);
    }

    #[test]
    fn zero_thread_count_is_rejected() {
        assert!(build_thread_pool(Some(0)).is_err());
    }
}
