use rayon::prelude::*;

use crate::bitmap::Bitmap;
use crate::error::{RefocusError, RefocusResult};
use crate::pixel::Rgb;

/// Policy for sampling convolution input outside the image extents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ConvolutionMode {
    /// Out-of-range samples are black.
    Zero,
    /// Out-of-range coordinates clamp to the nearest valid pixel.
    #[default]
    RepeatEdges,
    /// Coordinates wrap modulo width/height.
    Torus,
}

/// A square convolution kernel with an odd side length of at least 3.
#[derive(Clone, Debug, PartialEq)]
pub struct Kernel {
    side: usize,
    weights: Vec<f64>,
}

impl Kernel {
    /// Builds a kernel from row slices. All rows must have the same length as
    /// the row count, and the side must be odd and >= 3.
    pub fn from_rows(rows: &[&[f64]]) -> RefocusResult<Self> {
        let side = rows.len();
        if rows.iter().any(|r| r.len() != side) {
            return Err(RefocusError::validation("convolution kernel must be square"));
        }
        let weights = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Self::from_flat(side, weights)
    }

    /// Builds a kernel from a flat row-major weight vector of `side * side`
    /// elements.
    pub fn from_flat(side: usize, weights: Vec<f64>) -> RefocusResult<Self> {
        if side < 3 || side % 2 == 0 {
            return Err(RefocusError::validation(
                "convolution kernel side must be odd and >= 3",
            ));
        }
        if weights.len() != side * side {
            return Err(RefocusError::validation("convolution kernel must be square"));
        }
        Ok(Self { side, weights })
    }

    pub fn side(&self) -> usize {
        self.side
    }

    fn weight(&self, i: usize, j: usize) -> f64 {
        self.weights[i * self.side + j]
    }
}

/// Convolves `src` against a kernel pair and combines the two responses per
/// channel as `sqrt(h^2 + v^2)`, clamped to [0, 1]: a Sobel-style gradient
/// magnitude. The output has the same dimensions as the input and is fully
/// opaque. Both kernels must have the same side length.
///
/// Every output row is independent of every other, so rows are computed in
/// parallel; each worker owns a disjoint slice of the destination buffer.
pub fn convolve(
    src: &Bitmap,
    hkernel: &Kernel,
    vkernel: &Kernel,
    mode: ConvolutionMode,
) -> RefocusResult<Bitmap> {
    if hkernel.side() != vkernel.side() {
        return Err(RefocusError::validation(
            "convolution kernel pair must have equal size",
        ));
    }

    let (w, h) = (src.width(), src.height());
    let mut out = Bitmap::new(w, h)?;
    let side = hkernel.side();
    let half = (side / 2) as i64;
    let row_bytes = (w as usize) * 4;

    out.as_bytes_mut()
        .par_chunks_mut(row_bytes.max(4))
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..w as usize {
                let mut rh = 0.0;
                let mut gh = 0.0;
                let mut bh = 0.0;
                let mut rv = 0.0;
                let mut gv = 0.0;
                let mut bv = 0.0;

                // Kernel index `i` moves along x and `j` along y, matching the
                // row-major kernel layout used by the autofocus kernels.
                for i in 0..side {
                    for j in 0..side {
                        let sx = x as i64 + i as i64 - half;
                        let sy = y as i64 + j as i64 - half;
                        let color = sample(src, sx, sy, mode);

                        rh += hkernel.weight(i, j) * color.rf();
                        gh += hkernel.weight(i, j) * color.gf();
                        bh += hkernel.weight(i, j) * color.bf();

                        rv += vkernel.weight(i, j) * color.rf();
                        gv += vkernel.weight(i, j) * color.gf();
                        bv += vkernel.weight(i, j) * color.bf();
                    }
                }

                let px = Rgb::from_f(
                    (rh * rh + rv * rv).sqrt(),
                    (gh * gh + gv * gv).sqrt(),
                    (bh * bh + bv * bv).sqrt(),
                );
                let o = x * 4;
                row[o..o + 4].copy_from_slice(&[px.r, px.g, px.b, 255]);
            }
        });

    Ok(out)
}

fn sample(src: &Bitmap, x: i64, y: i64, mode: ConvolutionMode) -> Rgb {
    let (w, h) = (i64::from(src.width()), i64::from(src.height()));
    if x >= 0 && y >= 0 && x < w && y < h {
        return src.pixel(x as u32, y as u32);
    }
    match mode {
        ConvolutionMode::Zero => Rgb::BLACK,
        ConvolutionMode::RepeatEdges => {
            src.pixel(x.clamp(0, w - 1) as u32, y.clamp(0, h - 1) as u32)
        }
        ConvolutionMode::Torus => src.pixel(x.rem_euclid(w) as u32, y.rem_euclid(h) as u32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_kernels() -> (Kernel, Kernel) {
        let h = Kernel::from_rows(&[&[-1.0, 1.0, -1.0], &[0.0, 0.0, 0.0], &[1.0, -1.0, 1.0]])
            .unwrap();
        let v = Kernel::from_rows(&[&[-1.0, 0.0, 1.0], &[1.0, 0.0, -1.0], &[-1.0, 0.0, 1.0]])
            .unwrap();
        (h, v)
    }

    #[test]
    fn kernel_rejects_even_side() {
        assert!(Kernel::from_flat(4, vec![0.0; 16]).is_err());
    }

    #[test]
    fn kernel_rejects_side_below_3() {
        assert!(Kernel::from_flat(1, vec![0.0]).is_err());
    }

    #[test]
    fn kernel_rejects_non_square_rows() {
        assert!(Kernel::from_rows(&[&[1.0, 2.0], &[3.0]]).is_err());
    }

    #[test]
    fn convolve_rejects_mismatched_kernel_pair() {
        let k3 = Kernel::from_flat(3, vec![0.0; 9]).unwrap();
        let k5 = Kernel::from_flat(5, vec![0.0; 25]).unwrap();
        let src = Bitmap::new(4, 4).unwrap();
        assert!(convolve(&src, &k3, &k5, ConvolutionMode::Zero).is_err());
    }

    #[test]
    fn output_preserves_dimensions() {
        let (h, v) = gradient_kernels();
        let src = Bitmap::new(7, 5).unwrap();
        let out = convolve(&src, &h, &v, ConvolutionMode::RepeatEdges).unwrap();
        assert_eq!(out.width(), 7);
        assert_eq!(out.height(), 5);
    }

    #[test]
    fn repeat_edges_on_uniform_image_has_zero_gradient() {
        let (h, v) = gradient_kernels();
        let mut src = Bitmap::new(6, 6).unwrap();
        src.fill([90, 120, 200, 255]);
        let out = convolve(&src, &h, &v, ConvolutionMode::RepeatEdges).unwrap();
        for y in 0..6 {
            for x in 0..6 {
                assert_eq!(out.pixel(x, y), Rgb::BLACK);
            }
        }
    }

    #[test]
    fn torus_convolution_is_shift_equivariant() {
        let (hk, vk) = gradient_kernels();
        let (w, h) = (5u32, 4u32);
        let mut src = Bitmap::new(w, h).unwrap();
        for y in 0..h {
            for x in 0..w {
                let v = ((x * 37 + y * 91) % 256) as u8;
                src.set_pixel(x, y, Rgb::new(v, v.wrapping_mul(3), v ^ 0x5a));
            }
        }

        let mut shifted = Bitmap::new(w, h).unwrap();
        for y in 0..h {
            for x in 0..w {
                shifted.set_pixel((x + 1) % w, y, src.pixel(x, y));
            }
        }

        let out = convolve(&src, &hk, &vk, ConvolutionMode::Torus).unwrap();
        let out_shifted = convolve(&shifted, &hk, &vk, ConvolutionMode::Torus).unwrap();
        for y in 0..h {
            for x in 0..w {
                assert_eq!(out_shifted.pixel((x + 1) % w, y), out.pixel(x, y));
            }
        }
    }

    #[test]
    fn zero_mode_sees_black_outside_the_image() {
        let ones = Kernel::from_flat(3, vec![0.1; 9]).unwrap();
        let zeros = Kernel::from_flat(3, vec![0.0; 9]).unwrap();
        let mut src = Bitmap::new(3, 3).unwrap();
        src.fill([128, 128, 128, 255]);
        let zero = convolve(&src, &ones, &zeros, ConvolutionMode::Zero).unwrap();
        let repeat = convolve(&src, &ones, &zeros, ConvolutionMode::RepeatEdges).unwrap();
        // Interior pixel is unaffected by the boundary policy.
        assert_eq!(zero.pixel(1, 1), repeat.pixel(1, 1));
        // Corners see synthetic black neighbors under zero fill.
        assert!(zero.pixel(0, 0).r < repeat.pixel(0, 0).r);
    }
}
