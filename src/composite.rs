use crate::bitmap::Bitmap;

pub type PremulRgba8 = [u8; 4];

/// Source-over blend of premultiplied RGBA8 pixels with an extra opacity
/// factor applied to `src`.
pub fn over(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let sa = mul_div255(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }

    let inv = 255u16 - u16::from(sa);

    let mut out = [0u8; 4];
    out[3] = add_sat_u8(sa, mul_div255(u16::from(dst[3]), inv));

    for i in 0..3 {
        let sc = mul_div255(u16::from(src[i]), op);
        let dc = mul_div255(u16::from(dst[i]), inv);
        out[i] = add_sat_u8(sc, dc);
    }
    out
}

/// Draws `src` over `dst` with its top-left corner at `(x_offset, y_offset)`,
/// clipping whatever falls outside the destination.
pub fn draw_over(dst: &mut Bitmap, src: &Bitmap, x_offset: i32, y_offset: i32) {
    for sy in 0..src.height() {
        let dy = y_offset + sy as i32;
        if dy < 0 || dy >= dst.height() as i32 {
            continue;
        }
        for sx in 0..src.width() {
            let dx = x_offset + sx as i32;
            if dx < 0 || dx >= dst.width() as i32 {
                continue;
            }
            let blended = over(
                dst.rgba(dx as u32, dy as u32),
                src.rgba(sx, sy),
                1.0,
            );
            dst.set_rgba(dx as u32, dy as u32, blended);
        }
    }
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

fn add_sat_u8(a: u8, b: u8) -> u8 {
    a.saturating_add(b)
}
