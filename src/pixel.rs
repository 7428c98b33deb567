/// An 8-bit-per-channel RGB color value.
///
/// Channels are stored as bytes; the `*_f` accessors view them as normalized
/// floats in [0, 1]. Float writes clamp before quantizing, so out-of-range
/// inputs are never an error. A pixel packs losslessly into the low 24 bits of
/// a `u32` (any alpha high byte is ignored on unpack).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Builds a pixel from normalized float channels, clamping each to [0, 1].
    pub fn from_f(r: f64, g: f64, b: f64) -> Self {
        let mut px = Self::BLACK;
        px.set_rf(r);
        px.set_gf(g);
        px.set_bf(b);
        px
    }

    /// Builds a gray pixel from one normalized float value.
    pub fn from_gray_f(v: f64) -> Self {
        Self::from_f(v, v, v)
    }

    /// Unpacks the low 24 bits of `raw` as `0x00RRGGBB`; bits 24..32 are ignored.
    pub fn from_raw(raw: u32) -> Self {
        Self {
            r: ((raw >> 16) & 0xff) as u8,
            g: ((raw >> 8) & 0xff) as u8,
            b: (raw & 0xff) as u8,
        }
    }

    /// Packs the pixel as `0x00RRGGBB`.
    pub fn raw(self) -> u32 {
        (u32::from(self.r) << 16) | (u32::from(self.g) << 8) | u32::from(self.b)
    }

    /// Integer grayscale: the mean of the three channel bytes.
    pub fn gray(self) -> u8 {
        ((u16::from(self.r) + u16::from(self.g) + u16::from(self.b)) / 3) as u8
    }

    /// Normalized grayscale: the mean of the three float channels.
    pub fn gray_f(self) -> f64 {
        (self.rf() + self.gf() + self.bf()) / 3.0
    }

    pub fn rf(self) -> f64 {
        f64::from(self.r) / 255.0
    }

    pub fn gf(self) -> f64 {
        f64::from(self.g) / 255.0
    }

    pub fn bf(self) -> f64 {
        f64::from(self.b) / 255.0
    }

    pub fn set_rf(&mut self, v: f64) {
        self.r = quantize(v);
    }

    pub fn set_gf(&mut self, v: f64) {
        self.g = quantize(v);
    }

    pub fn set_bf(&mut self, v: f64) {
        self.b = quantize(v);
    }
}

fn quantize(v: f64) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0) as u8
}
