use crate::error::{RefocusError, RefocusResult};
use crate::pixel::Rgb;

/// An axis-aligned rectangle in scene-pixel coordinates, stored as a corner
/// pair. The corners may arrive in any order; [`Rect::normalized`] sorts them
/// per axis. A zero-area rectangle is "degenerate" and means "whole image" to
/// consumers that accept a selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Rect {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl Rect {
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Returns the same rectangle with `x0 <= x1` and `y0 <= y1`.
    pub fn normalized(self) -> Self {
        Self {
            x0: self.x0.min(self.x1),
            y0: self.y0.min(self.y1),
            x1: self.x0.max(self.x1),
            y1: self.y0.max(self.y1),
        }
    }

    pub fn width(self) -> i32 {
        (self.x1 - self.x0).abs()
    }

    pub fn height(self) -> i32 {
        (self.y1 - self.y0).abs()
    }

    pub fn is_degenerate(self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Intersects the normalized rectangle with `[0, width) x [0, height)`.
    /// Returns `None` when nothing remains.
    pub fn clipped_to(self, width: u32, height: u32) -> Option<Self> {
        let n = self.normalized();
        let x0 = n.x0.max(0);
        let y0 = n.y0.max(0);
        let x1 = n.x1.min(width as i32);
        let y1 = n.y1.min(height as i32);
        if x0 >= x1 || y0 >= y1 {
            None
        } else {
            Some(Self { x0, y0, x1, y1 })
        }
    }
}

/// A fixed-size RGBA8 pixel buffer with premultiplied alpha.
///
/// Storage is one contiguous row-major byte array; all `(x, y)` access goes
/// through bounds-checked indexing. A freshly allocated bitmap is fully
/// transparent. The [`Rgb`] pixel-model accessors read and write the color
/// bytes directly and treat written pixels as opaque.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Bitmap {
    pub fn new(width: u32, height: u32) -> RefocusResult<Self> {
        let len = byte_len(width, height)?;
        Ok(Self {
            width,
            height,
            data: vec![0u8; len],
        })
    }

    /// Wraps an existing RGBA8 byte buffer. `data` must be exactly
    /// `width * height * 4` bytes.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> RefocusResult<Self> {
        let len = byte_len(width, height)?;
        if data.len() != len {
            return Err(RefocusError::evaluation(
                "bitmap buffer must be width*height*4 bytes",
            ));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn index(&self, x: u32, y: u32) -> usize {
        ((y as usize) * (self.width as usize) + (x as usize)) * 4
    }

    /// Reads one RGBA pixel. Panics when `(x, y)` is outside the bitmap.
    pub fn rgba(&self, x: u32, y: u32) -> [u8; 4] {
        assert!(x < self.width && y < self.height, "pixel out of bounds");
        let i = self.index(x, y);
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    /// Writes one RGBA pixel. Panics when `(x, y)` is outside the bitmap.
    pub fn set_rgba(&mut self, x: u32, y: u32, px: [u8; 4]) {
        assert!(x < self.width && y < self.height, "pixel out of bounds");
        let i = self.index(x, y);
        self.data[i..i + 4].copy_from_slice(&px);
    }

    /// Reads the color bytes of one pixel as an [`Rgb`] value (alpha dropped).
    pub fn pixel(&self, x: u32, y: u32) -> Rgb {
        let [r, g, b, _] = self.rgba(x, y);
        Rgb::new(r, g, b)
    }

    /// Writes one pixel from an [`Rgb`] value, making it opaque.
    pub fn set_pixel(&mut self, x: u32, y: u32, px: Rgb) {
        self.set_rgba(x, y, [px.r, px.g, px.b, 255]);
    }

    pub fn fill(&mut self, px: [u8; 4]) {
        for chunk in self.data.chunks_exact_mut(4) {
            chunk.copy_from_slice(&px);
        }
    }

    /// Copies out the sub-image covered by `rect` (already normalized and
    /// clipped by the caller via [`Rect::clipped_to`]).
    pub fn crop(&self, rect: Rect) -> RefocusResult<Bitmap> {
        let rect = rect
            .clipped_to(self.width, self.height)
            .ok_or_else(|| RefocusError::evaluation("crop rectangle has no overlap"))?;
        let (w, h) = (rect.width() as u32, rect.height() as u32);
        let mut out = Bitmap::new(w, h)?;
        for y in 0..h {
            let src_y = (rect.y0 as u32 + y) as usize;
            let src_start = (src_y * self.width as usize + rect.x0 as usize) * 4;
            let src_end = src_start + (w as usize) * 4;
            let dst_start = (y as usize) * (w as usize) * 4;
            out.data[dst_start..dst_start + (w as usize) * 4]
                .copy_from_slice(&self.data[src_start..src_end]);
        }
        Ok(out)
    }

    /// Converts a straight-alpha `image` buffer into a premultiplied bitmap.
    pub fn from_rgba_image(img: &image::RgbaImage) -> RefocusResult<Self> {
        let (w, h) = img.dimensions();
        let mut data = img.as_raw().clone();
        for px in data.chunks_exact_mut(4) {
            let a = u16::from(px[3]);
            for c in px.iter_mut().take(3) {
                *c = ((u16::from(*c) * a + 127) / 255) as u8;
            }
        }
        Self::from_raw(w, h, data)
    }

    /// Converts back to a straight-alpha `image` buffer.
    pub fn to_rgba_image(&self) -> RefocusResult<image::RgbaImage> {
        let mut data = self.data.clone();
        for px in data.chunks_exact_mut(4) {
            let a = u32::from(px[3]);
            if a > 0 {
                for c in px.iter_mut().take(3) {
                    *c = ((u32::from(*c) * 255 + a / 2) / a).min(255) as u8;
                }
            }
        }
        image::RgbaImage::from_raw(self.width, self.height, data)
            .ok_or_else(|| RefocusError::evaluation("bitmap does not fit an image buffer"))
    }
}

fn byte_len(width: u32, height: u32) -> RefocusResult<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(4))
        .ok_or_else(|| RefocusError::evaluation("bitmap size overflow"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_bitmap_is_transparent() {
        let bmp = Bitmap::new(2, 2).unwrap();
        assert_eq!(bmp.rgba(1, 1), [0, 0, 0, 0]);
    }

    #[test]
    fn from_raw_rejects_short_buffer() {
        assert!(Bitmap::from_raw(2, 2, vec![0u8; 15]).is_err());
    }

    #[test]
    fn pixel_round_trip_is_opaque() {
        let mut bmp = Bitmap::new(3, 3).unwrap();
        bmp.set_pixel(1, 2, Rgb::new(10, 20, 30));
        assert_eq!(bmp.pixel(1, 2), Rgb::new(10, 20, 30));
        assert_eq!(bmp.rgba(1, 2)[3], 255);
    }

    #[test]
    fn rect_normalizes_swapped_corners() {
        let r = Rect::new(5, 7, 1, 2).normalized();
        assert_eq!(r, Rect::new(1, 2, 5, 7));
        assert_eq!(r.width(), 4);
        assert_eq!(r.height(), 5);
    }

    #[test]
    fn degenerate_rect_has_zero_area() {
        assert!(Rect::new(3, 1, 3, 9).is_degenerate());
        assert!(Rect::default().is_degenerate());
        assert!(!Rect::new(0, 0, 1, 1).is_degenerate());
    }

    #[test]
    fn clip_drops_out_of_bounds_rects() {
        assert_eq!(Rect::new(-10, -10, -1, -1).clipped_to(4, 4), None);
        assert_eq!(
            Rect::new(-2, 1, 10, 3).clipped_to(4, 4),
            Some(Rect::new(0, 1, 4, 3))
        );
    }

    #[test]
    fn crop_copies_the_selected_rows() {
        let mut bmp = Bitmap::new(4, 4).unwrap();
        bmp.set_pixel(2, 1, Rgb::new(9, 9, 9));
        let sub = bmp.crop(Rect::new(1, 1, 4, 3)).unwrap();
        assert_eq!(sub.width(), 3);
        assert_eq!(sub.height(), 2);
        assert_eq!(sub.pixel(1, 0), Rgb::new(9, 9, 9));
    }

    #[test]
    fn image_round_trip_preserves_opaque_pixels() {
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([40, 80, 120, 255]));
        let bmp = Bitmap::from_rgba_image(&img).unwrap();
        assert_eq!(bmp.to_rgba_image().unwrap(), img);
    }
}
