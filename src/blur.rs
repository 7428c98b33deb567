use rayon::prelude::*;

use crate::bitmap::Bitmap;
use crate::error::RefocusResult;

/// Approximates a Gaussian blur of `radius` with three sequential box-blur
/// passes per channel plane (alpha, R, G, B), the standard three-box
/// approximation. Radius 0 returns a copy of the input.
///
/// Each pass is a separable sliding-window average (window `2*box_radius + 1`)
/// computed incrementally, O(1) amortized per pixel, with edge replication
/// for samples outside the image. The four planes are independent and run in
/// parallel; the input is never mutated.
pub fn gaussian_blur(src: &Bitmap, radius: u32) -> RefocusResult<Bitmap> {
    if radius == 0 || src.pixel_count() == 0 {
        return Ok(src.clone());
    }

    let w = src.width() as usize;
    let h = src.height() as usize;
    let n = w * h;

    // RGBA byte layout -> per-channel i32 planes, alpha first.
    let bytes = src.as_bytes();
    let mut planes: Vec<Vec<i32>> = vec![vec![0i32; n]; 4];
    for (i, px) in bytes.chunks_exact(4).enumerate() {
        planes[0][i] = i32::from(px[3]);
        planes[1][i] = i32::from(px[0]);
        planes[2][i] = i32::from(px[1]);
        planes[3][i] = i32::from(px[2]);
    }

    let sizes = boxes_for_gauss(radius, 3);

    planes.par_iter_mut().for_each(|plane| {
        let mut tmp = vec![0i32; n];
        for &size in &sizes {
            let box_radius = ((size - 1) / 2) as usize;
            box_blur_h(plane, &mut tmp, w, h, box_radius);
            box_blur_v(&tmp, plane, w, h, box_radius);
        }
    });

    let mut out = vec![0u8; n * 4];
    for (i, px) in out.chunks_exact_mut(4).enumerate() {
        px[0] = planes[1][i].clamp(0, 255) as u8;
        px[1] = planes[2][i].clamp(0, 255) as u8;
        px[2] = planes[3][i].clamp(0, 255) as u8;
        px[3] = planes[0][i].clamp(0, 255) as u8;
    }
    Bitmap::from_raw(src.width(), src.height(), out)
}

/// Derives the three box sizes whose sequential application approximates a
/// Gaussian of standard deviation `sigma`:
/// `w_ideal = sqrt(12*sigma^2/n + 1)`, floored to odd `wl`, `wu = wl + 2`, and
/// the first `m = round((12*sigma^2 - n*wl^2 - 4*n*wl - 3*n) / (-4*wl - 4))`
/// passes use `wl`, the rest `wu`.
fn boxes_for_gauss(sigma: u32, n: usize) -> Vec<i64> {
    let s = f64::from(sigma);
    let nf = n as f64;

    let w_ideal = (12.0 * s * s / nf + 1.0).sqrt();
    let mut wl = w_ideal.floor() as i64;
    if wl % 2 == 0 {
        wl -= 1;
    }
    let wu = wl + 2;

    let wlf = wl as f64;
    let m_ideal = (12.0 * s * s - nf * wlf * wlf - 4.0 * nf * wlf - 3.0 * nf) / (-4.0 * wlf - 4.0);
    let m = m_ideal.round() as i64;

    (0..n as i64).map(|i| if i < m { wl } else { wu }).collect()
}

// Window sums advance by adding the entering sample and subtracting the
// leaving one; out-of-range indices clamp to the row ends, which is exactly a
// sliding window over the edge-replicated signal and stays valid for any
// radius.
fn box_blur_h(src: &[i32], dst: &mut [i32], w: usize, h: usize, r: usize) {
    let inv = 1.0 / (2 * r + 1) as f64;
    let clamp = |i: i64| i.clamp(0, w as i64 - 1) as usize;

    for y in 0..h {
        let row = &src[y * w..y * w + w];
        let mut val: i64 = 0;
        for j in -(r as i64)..=(r as i64) {
            val += i64::from(row[clamp(j)]);
        }
        for x in 0..w {
            dst[y * w + x] = (val as f64 * inv).round() as i32;
            val += i64::from(row[clamp(x as i64 + r as i64 + 1)]);
            val -= i64::from(row[clamp(x as i64 - r as i64)]);
        }
    }
}

fn box_blur_v(src: &[i32], dst: &mut [i32], w: usize, h: usize, r: usize) {
    let inv = 1.0 / (2 * r + 1) as f64;
    let clamp = |i: i64| i.clamp(0, h as i64 - 1) as usize;

    for x in 0..w {
        let mut val: i64 = 0;
        for j in -(r as i64)..=(r as i64) {
            val += i64::from(src[clamp(j) * w + x]);
        }
        for y in 0..h {
            dst[y * w + x] = (val as f64 * inv).round() as i32;
            val += i64::from(src[clamp(y as i64 + r as i64 + 1) * w + x]);
            val -= i64::from(src[clamp(y as i64 - r as i64) * w + x]);
        }
    }
}
