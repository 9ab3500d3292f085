use crate::image::{Frame, Image};

/// Hue range of the 8-bit HSV representation, hue is stored halved.
pub const HUE_RANGE: u32 = 180;

/// 8-bit HSV of one RGB pixel, hue in [0, 180).
#[inline]
pub fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = (rgb[0] as i32, rgb[1] as i32, rgb[2] as i32);
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = v - min;

    let s = if v == 0 {
        0
    } else {
        (255 * diff + v / 2) / v
    };

    if diff == 0 {
        return [0, s as u8, v as u8];
    }
    let diff = diff as f64;
    let mut h = if v == r {
        60. * (g - b) as f64 / diff
    } else if v == g {
        120. + 60. * (b - r) as f64 / diff
    } else {
        240. + 60. * (r - g) as f64 / diff
    };
    if h < 0. {
        h += 360.;
    }
    let h = (h / 2.).round() as u32 % HUE_RANGE;
    [h as u8, s as u8, v as u8]
}

/// Split a frame into its hue plane and a validity mask of pixels whose
/// saturation and value fall inside the configured bounds. Grayscale frames
/// have no saturation so their mask only passes when `smin` is zero.
pub fn hue_and_mask(
    frame: &Frame,
    smin: i32,
    vmin: i32,
    vmax: i32,
    hue: &mut Image,
    mask: &mut Image,
) {
    hue.reallocate(frame.width, frame.height);
    mask.reallocate(frame.width, frame.height);
    let (vlo, vhi) = (vmin.min(vmax), vmin.max(vmax));

    for y in 0..frame.height {
        for x in 0..frame.width {
            let [h, s, v] = rgb_to_hsv(frame.rgb_at(x, y));
            hue.set_value(x, y, h);
            let (s, v) = (s as i32, v as i32);
            if s >= smin && v >= vlo && v <= vhi {
                mask.set_value(x, y, 255);
            }
        }
    }
}
