//! `color`: reinterprets the three channels of a frame in another color space
//!
//! Every conversion goes through RGB. Channel encodings follow the common
//! 8-bit conventions: HSV hue is halved to fit `0..180`, LAB lightness is
//! scaled to `0..255` with `a`/`b` offset by 128, YCbCr is BT.601 full range.

use image::Rgb;
use video_pipeline_common::Frame;
use video_pipeline_core::{
    BoundParams, DescriptorError, FormatDescriptor, FrameModule, ModuleDescriptor, ModuleError,
    ParameterDefinition, Role,
};

pub const ID: &str = "color";

const SPACES: [&str; 5] = ["YCbCr", "HSV", "LAB", "RGB", "BGR"];

pub(crate) fn descriptor() -> Result<ModuleDescriptor, DescriptorError> {
    ModuleDescriptor::builder(ID, Role::Transform)
        .description("Converts frames between color spaces")
        .parameter(ParameterDefinition::select("input_colorspace", &SPACES).with_default("RGB"))
        .parameter(ParameterDefinition::select("output_colorspace", &SPACES).with_default("RGB"))
        .input_format(
            FormatDescriptor::new()
                .field("pixel_format", "rgb24")
                .field("color_space", "param:input_colorspace"),
        )
        .output_format(
            FormatDescriptor::new()
                .field("pixel_format", "rgb24")
                .field("color_space", "param:output_colorspace"),
        )
        .build()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Rgb,
    Bgr,
    YCbCr,
    Hsv,
    Lab,
}

impl ColorSpace {
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "RGB" => Some(Self::Rgb),
            "BGR" => Some(Self::Bgr),
            "YCbCr" => Some(Self::YCbCr),
            "HSV" => Some(Self::Hsv),
            "LAB" => Some(Self::Lab),
            _ => None,
        }
    }

    fn decode(self, p: [u8; 3]) -> [u8; 3] {
        match self {
            Self::Rgb => p,
            Self::Bgr => [p[2], p[1], p[0]],
            Self::YCbCr => ycbcr_to_rgb(p),
            Self::Hsv => hsv_to_rgb(p),
            Self::Lab => lab_to_rgb(p),
        }
    }

    fn encode(self, p: [u8; 3]) -> [u8; 3] {
        match self {
            Self::Rgb => p,
            Self::Bgr => [p[2], p[1], p[0]],
            Self::YCbCr => rgb_to_ycbcr(p),
            Self::Hsv => rgb_to_hsv(p),
            Self::Lab => rgb_to_lab(p),
        }
    }
}

/// Convert every pixel from `input` to `output`
#[must_use]
pub fn convert_frame(frame: &Frame, input: ColorSpace, output: ColorSpace) -> Frame {
    if input == output {
        return frame.clone();
    }
    let mut out = frame.clone();
    for p in out.pixels_mut() {
        *p = Rgb(output.encode(input.decode(p.0)));
    }
    out
}

#[derive(Debug, Default)]
pub struct Color;

impl FrameModule for Color {
    fn process_frame(&self, inputs: &[&Frame], params: &BoundParams) -> Result<Frame, ModuleError> {
        let frame: &Frame = inputs
            .first()
            .copied()
            .ok_or_else(|| ModuleError::InvalidInput("color needs one input frame".to_string()))?;
        let space = |key: &str| {
            let name = params.get_str(key).unwrap_or("RGB");
            ColorSpace::parse(name).ok_or_else(|| {
                ModuleError::InvalidInput(format!("unsupported color space: {name}"))
            })
        };
        Ok(convert_frame(frame, space("input_colorspace")?, space("output_colorspace")?))
    }
}

fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

fn rgb_to_ycbcr([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    [
        to_u8(y),
        to_u8(128.0 + (b - y) * 0.564),
        to_u8(128.0 + (r - y) * 0.713),
    ]
}

fn ycbcr_to_rgb([y, cb, cr]: [u8; 3]) -> [u8; 3] {
    let (y, cb, cr) = (f32::from(y), f32::from(cb) - 128.0, f32::from(cr) - 128.0);
    [
        to_u8(y + 1.403 * cr),
        to_u8(y - 0.714 * cr - 0.344 * cb),
        to_u8(y + 1.773 * cb),
    ]
}

fn rgb_to_hsv([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    let s = if max > 0.0 { 255.0 * delta / max } else { 0.0 };
    let mut h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }
    [to_u8(h / 2.0).min(179), to_u8(s), to_u8(max)]
}

fn hsv_to_rgb([h, s, v]: [u8; 3]) -> [u8; 3] {
    let h = f32::from(h.min(179)) * 2.0;
    let s = f32::from(s) / 255.0;
    let v = f32::from(v);
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;
    let (r, g, b) = match (h / 60.0) as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    [to_u8(r + m), to_u8(g + m), to_u8(b + m)]
}

// D65 white point
const WHITE: [f32; 3] = [0.950_456, 1.0, 1.088_754];

fn srgb_to_linear(c: u8) -> f32 {
    let c = f32::from(c) / 255.0;
    if c <= 0.040_45 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f32) -> u8 {
    let c = if c <= 0.003_130_8 {
        12.92 * c
    } else {
        1.055 * c.max(0.0).powf(1.0 / 2.4) - 0.055
    };
    to_u8(c * 255.0)
}

fn rgb_to_lab([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = (srgb_to_linear(r), srgb_to_linear(g), srgb_to_linear(b));
    let xyz = [
        0.412_453 * r + 0.357_580 * g + 0.180_423 * b,
        0.212_671 * r + 0.715_160 * g + 0.072_169 * b,
        0.019_334 * r + 0.119_193 * g + 0.950_227 * b,
    ];
    let f = |t: f32| {
        if t > 0.008_856 {
            t.cbrt()
        } else {
            7.787 * t + 16.0 / 116.0
        }
    };
    let [fx, fy, fz] = [0, 1, 2].map(|i| f(xyz[i] / WHITE[i]));
    let l = 116.0 * fy - 16.0;
    let a = 500.0 * (fx - fy);
    let bb = 200.0 * (fy - fz);
    [to_u8(l * 255.0 / 100.0), to_u8(a + 128.0), to_u8(bb + 128.0)]
}

fn lab_to_rgb([l, a, b]: [u8; 3]) -> [u8; 3] {
    let l = f32::from(l) * 100.0 / 255.0;
    let a = f32::from(a) - 128.0;
    let b = f32::from(b) - 128.0;
    let fy = (l + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;
    let inv = |t: f32| {
        if t > 0.206_893 {
            t * t * t
        } else {
            (t - 16.0 / 116.0) / 7.787
        }
    };
    let [x, y, z] = [(fx, WHITE[0]), (fy, WHITE[1]), (fz, WHITE[2])].map(|(f, w)| inv(f) * w);
    let r = 3.240_479 * x - 1.537_150 * y - 0.498_535 * z;
    let g = -0.969_256 * x + 1.875_992 * y + 0.041_556 * z;
    let bl = 0.055_648 * x - 0.204_043 * y + 1.057_311 * z;
    [linear_to_srgb(r), linear_to_srgb(g), linear_to_srgb(bl)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SAMPLES: [[u8; 3]; 6] = [
        [0, 0, 0],
        [255, 255, 255],
        [200, 30, 40],
        [20, 180, 60],
        [10, 40, 220],
        [128, 128, 128],
    ];

    fn assert_close(a: [u8; 3], b: [u8; 3], tolerance: u8) {
        for c in 0..3 {
            assert!(a[c].abs_diff(b[c]) <= tolerance, "{a:?} vs {b:?}");
        }
    }

    #[test]
    fn test_same_space_is_passthrough() {
        let frame = Frame::from_pixel(4, 4, Rgb([1, 2, 3]));
        assert_eq!(convert_frame(&frame, ColorSpace::Hsv, ColorSpace::Hsv), frame);
    }

    #[test]
    fn test_bgr_swaps_channels() {
        let frame = Frame::from_pixel(2, 2, Rgb([1, 2, 3]));
        let out = convert_frame(&frame, ColorSpace::Rgb, ColorSpace::Bgr);
        assert_eq!(out.get_pixel(0, 0).0, [3, 2, 1]);
    }

    #[test]
    fn test_known_values() {
        assert_eq!(rgb_to_hsv([255, 0, 0]), [0, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 255, 0]), [60, 255, 255]);
        assert_eq!(rgb_to_ycbcr([255, 255, 255]), [255, 128, 128]);
        assert_close(rgb_to_lab([255, 255, 255]), [255, 128, 128], 1);
        assert_close(rgb_to_lab([0, 0, 0]), [0, 128, 128], 1);
    }

    #[test]
    fn test_round_trips_through_rgb() {
        for space in [ColorSpace::YCbCr, ColorSpace::Hsv, ColorSpace::Lab] {
            for p in SAMPLES {
                assert_close(space.decode(space.encode(p)), p, 4);
            }
        }
    }

    #[test]
    fn test_module_reads_parameters() {
        let params = video_pipeline_core::bind(
            "c",
            &descriptor().unwrap(),
            &[("output_colorspace".to_string(), "BGR".into())],
        )
        .unwrap();
        let frame = Frame::from_pixel(2, 2, Rgb([9, 8, 7]));
        let out = Color.process_frame(&[&frame], &params).unwrap();
        assert_eq!(out.get_pixel(1, 1).0, [7, 8, 9]);
    }

    proptest! {
        #[test]
        fn prop_ycbcr_round_trip_is_close(r in any::<u8>(), g in any::<u8>(), b in any::<u8>()) {
            let p = [r, g, b];
            let back = ColorSpace::YCbCr.decode(ColorSpace::YCbCr.encode(p));
            for c in 0..3 {
                prop_assert!(back[c].abs_diff(p[c]) <= 3, "{:?} -> {:?}", p, back);
            }
        }

        #[test]
        fn prop_bgr_is_an_involution(w in 1u32..8, h in 1u32..8, seed in any::<u8>()) {
            let frame = Frame::from_fn(w, h, |x, y| {
                Rgb([seed.wrapping_add(x as u8), (y as u8).wrapping_mul(31), seed ^ 0x5a])
            });
            let swapped = convert_frame(&frame, ColorSpace::Rgb, ColorSpace::Bgr);
            prop_assert_eq!(convert_frame(&swapped, ColorSpace::Bgr, ColorSpace::Rgb), frame);
        }
    }
}
