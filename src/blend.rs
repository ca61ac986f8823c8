// based on https://github.com/aseprite/aseprite/blob/master/src/doc/blend_funcs.cpp
use crate::{
    layer::BlendMode,
    pixel::{BlendFn, Gray, Indexed},
};
use image::Rgba;

pub(crate) type Color8 = Rgba<u8>;

// Per-channel operator: (backdrop, src) -> result, all in 0..=255.
type ChannelOp = fn(i32, i32) -> i32;

/// Blend `src` onto `backdrop` using `mode`, with `opacity` scaling the
/// source alpha.
///
/// ```
/// use asedecode::{blend_rgba, BlendMode};
/// use image::Rgba;
///
/// let out = blend_rgba(BlendMode::Normal, Rgba([0, 0, 0, 0]), Rgba([10, 20, 30, 200]), 255);
/// assert_eq!(out, Rgba([10, 20, 30, 200]));
/// ```
pub fn blend_rgba(mode: BlendMode, backdrop: Rgba<u8>, src: Rgba<u8>, opacity: u8) -> Rgba<u8> {
    rgba_blender(mode)(backdrop, src, opacity)
}

/// Grayscale counterpart of [blend_rgba]. The HSV family and the tint modes
/// fall back to normal blending.
pub fn blend_gray(mode: BlendMode, backdrop: Gray, src: Gray, opacity: u8) -> Gray {
    gray_blender(mode)(backdrop, src, opacity)
}

pub(crate) fn rgba_blender(mode: BlendMode) -> BlendFn<Color8> {
    if let Some(op) = channel_op(mode) {
        return Box::new(move |backdrop, src, opacity| rgb_channels(backdrop, src, opacity, op));
    }
    let f: fn(Color8, Color8, u8) -> Color8 = match mode {
        BlendMode::Src => src_only,
        BlendMode::Merge => merge,
        BlendMode::NegBW => neg_bw,
        BlendMode::RedTint => red_tint,
        BlendMode::BlueTint => blue_tint,
        BlendMode::Hue => hsl_hue,
        BlendMode::Saturation => hsl_saturation,
        BlendMode::Color => hsl_color,
        BlendMode::Luminosity => hsl_luminosity,
        // Normal, plus the channel modes handled above.
        _ => normal,
    };
    Box::new(f)
}

pub(crate) fn gray_blender(mode: BlendMode) -> BlendFn<Gray> {
    if let Some(op) = channel_op(mode) {
        return Box::new(move |backdrop, src, opacity| gray_channel(backdrop, src, opacity, op));
    }
    let f: fn(Gray, Gray, u8) -> Gray = match mode {
        BlendMode::Src => src_only,
        BlendMode::Merge => merge_gray,
        BlendMode::NegBW => neg_bw_gray,
        _ => normal_gray,
    };
    Box::new(f)
}

/// Palette indices cannot be mixed, so every mode replaces.
pub(crate) fn indexed_blender(_mode: BlendMode) -> BlendFn<Indexed> {
    Box::new(src_only::<Indexed>)
}

fn channel_op(mode: BlendMode) -> Option<ChannelOp> {
    let op: ChannelOp = match mode {
        BlendMode::Addition => blend_addition,
        BlendMode::Subtract => blend_subtract,
        BlendMode::Multiply => blend_multiply,
        BlendMode::Divide => blend_divide,
        BlendMode::Screen => blend_screen,
        BlendMode::Overlay => blend_overlay,
        BlendMode::Darken => blend_darken,
        BlendMode::Lighten => blend_lighten,
        BlendMode::ColorDodge => blend_color_dodge,
        BlendMode::ColorBurn => blend_color_burn,
        BlendMode::HardLight => blend_hard_light,
        BlendMode::SoftLight => blend_soft_light,
        BlendMode::Difference => blend_difference,
        BlendMode::Exclusion => blend_exclusion,
        _ => return None,
    };
    Some(op)
}

// MUL_UN8(a, b, t) ((t) = (a) * (uint16_t)(b) + ONE_HALF, ((((t) >> G_SHIFT ) + (t) ) >> G_SHIFT ))
//
// Rounded a*b/255. Also used with negative `a` (merge), relying on the
// arithmetic shift.
pub(crate) fn mul_un8(a: i32, b: i32) -> i32 {
    let t = a * b + 0x80;
    ((t >> 8) + t) >> 8
}

// DIV_UN8(a, b)    (((uint16_t) (a) * 0xff + ((b) / 2)) / (b))
fn div_un8(a: i32, b: i32) -> i32 {
    (a * 0xff + b / 2) / b
}

fn blend_addition(b: i32, s: i32) -> i32 {
    (b + s).min(255)
}

fn blend_subtract(b: i32, s: i32) -> i32 {
    (b - s).max(0)
}

fn blend_multiply(b: i32, s: i32) -> i32 {
    mul_un8(b, s)
}

// blend_screen(b, s, t)     ((b) + (s) - MUL_UN8((b), (s), (t)))
fn blend_screen(b: i32, s: i32) -> i32 {
    b + s - mul_un8(b, s)
}

fn blend_overlay(b: i32, s: i32) -> i32 {
    blend_hard_light(s, b)
}

fn blend_darken(b: i32, s: i32) -> i32 {
    b.min(s)
}

fn blend_lighten(b: i32, s: i32) -> i32 {
    b.max(s)
}

fn blend_hard_light(b: i32, s: i32) -> i32 {
    if s < 128 {
        blend_multiply(b, s << 1)
    } else {
        blend_screen(b, (s << 1) - 255)
    }
}

fn blend_difference(b: i32, s: i32) -> i32 {
    (b - s).abs()
}

fn blend_exclusion(b: i32, s: i32) -> i32 {
    b + s - 2 * mul_un8(b, s)
}

fn blend_divide(b: i32, s: i32) -> i32 {
    if b == 0 {
        0
    } else if b >= s {
        255
    } else {
        // in floating point: b / s
        div_un8(b, s)
    }
}

fn blend_color_dodge(b: i32, s: i32) -> i32 {
    if b == 0 {
        return 0;
    }
    let s = 255 - s;
    if b >= s {
        255
    } else {
        // in floating point: b / (1-s)
        div_un8(b, s)
    }
}

fn blend_color_burn(b: i32, s: i32) -> i32 {
    if b == 255 {
        return 255;
    }
    let b = 255 - b;
    if b >= s {
        0
    } else {
        // in floating point: 1 - ((1-b)/s)
        255 - div_un8(b, s)
    }
}

fn blend_soft_light(b: i32, s: i32) -> i32 {
    let b = b as f64 / 255.0;
    let s = s as f64 / 255.0;

    let d = if b <= 0.25 {
        ((16.0 * b - 12.0) * b + 4.0) * b
    } else {
        b.sqrt()
    };

    let r = if s <= 0.5 {
        b - (1.0 - 2.0 * s) * b * (1.0 - b)
    } else {
        b + (2.0 * s - 1.0) * (d - b)
    };

    (r * 255.0 + 0.5) as i32
}

fn src_only<P>(_backdrop: P, src: P, _opacity: u8) -> P {
    src
}

fn as_rgba_i32(color: Color8) -> [i32; 4] {
    let [r, g, b, a] = color.0;
    [r as i32, g as i32, b as i32, a as i32]
}

fn from_rgba_i32(r: i32, g: i32, b: i32, a: i32) -> Color8 {
    debug_assert!((0..=255).contains(&r));
    debug_assert!((0..=255).contains(&g));
    debug_assert!((0..=255).contains(&b));
    debug_assert!((0..=255).contains(&a));
    Rgba([r as u8, g as u8, b as u8, a as u8])
}

// based on: rgba_blender_normal(color_t backdrop, color_t src, int opacity)
pub(crate) fn normal(backdrop: Color8, src: Color8, opacity: u8) -> Color8 {
    let [back_r, back_g, back_b, back_a] = as_rgba_i32(backdrop);
    let [src_r, src_g, src_b, src_a] = as_rgba_i32(src);

    if back_a == 0 {
        let alpha = mul_un8(src_a, opacity as i32);
        return from_rgba_i32(src_r, src_g, src_b, alpha);
    } else if src_a == 0 {
        return backdrop;
    }

    let src_a = mul_un8(src_a, opacity as i32);

    let res_a = src_a + back_a - mul_un8(back_a, src_a);

    let res_r = back_r + ((src_r - back_r) * src_a) / res_a;
    let res_g = back_g + ((src_g - back_g) * src_a) / res_a;
    let res_b = back_b + ((src_b - back_b) * src_a) / res_a;

    from_rgba_i32(res_r, res_g, res_b, res_a)
}

pub(crate) fn merge(backdrop: Color8, src: Color8, opacity: u8) -> Color8 {
    let [back_r, back_g, back_b, back_a] = as_rgba_i32(backdrop);
    let [src_r, src_g, src_b, src_a] = as_rgba_i32(src);
    let opacity = opacity as i32;

    let (res_r, res_g, res_b) = if back_a == 0 {
        (src_r, src_g, src_b)
    } else if src_a == 0 {
        (back_r, back_g, back_b)
    } else {
        (
            back_r + mul_un8(src_r - back_r, opacity),
            back_g + mul_un8(src_g - back_g, opacity),
            back_b + mul_un8(src_b - back_b, opacity),
        )
    };
    let res_a = back_a + mul_un8(src_a - back_a, opacity);
    if res_a == 0 {
        Rgba([0, 0, 0, 0])
    } else {
        from_rgba_i32(res_r, res_g, res_b, res_a)
    }
}

// Rec. 709 luma, truncated. Only used by the NegBW and tint modes.
fn luma(color: Color8) -> i32 {
    let [r, g, b, _] = color.0;
    (r as f64 * 0.2126 + g as f64 * 0.7152 + b as f64 * 0.0722) as i32
}

fn neg_bw(backdrop: Color8, _src: Color8, _opacity: u8) -> Color8 {
    if backdrop[3] == 0 || luma(backdrop) >= 128 {
        Rgba([0, 0, 0, 255])
    } else {
        Rgba([255, 255, 255, 255])
    }
}

fn red_tint(backdrop: Color8, src: Color8, opacity: u8) -> Color8 {
    let v = luma(src);
    let tinted = from_rgba_i32((255 + v) / 2, v / 2, v / 2, src[3] as i32);
    normal(backdrop, tinted, opacity)
}

fn blue_tint(backdrop: Color8, src: Color8, opacity: u8) -> Color8 {
    let v = luma(src);
    let tinted = from_rgba_i32(v / 2, v / 2, (255 + v) / 2, src[3] as i32);
    normal(backdrop, tinted, opacity)
}

/*
  int t;
  int r = blend_multiply(rgba_getr(backdrop), rgba_getr(src), t);
  int g = blend_multiply(rgba_getg(backdrop), rgba_getg(src), t);
  int b = blend_multiply(rgba_getb(backdrop), rgba_getb(src), t);
  src = rgba(r, g, b, 0) | (src & rgba_a_mask);
  return rgba_blender_normal(backdrop, src, opacity);
*/
fn rgb_channels(backdrop: Color8, src: Color8, opacity: u8, op: ChannelOp) -> Color8 {
    let [back_r, back_g, back_b, _] = as_rgba_i32(backdrop);
    let [src_r, src_g, src_b, src_a] = as_rgba_i32(src);
    let r = op(back_r, src_r);
    let g = op(back_g, src_g);
    let b = op(back_b, src_b);
    normal(backdrop, from_rgba_i32(r, g, b, src_a), opacity)
}

// HSV family. Works on normalized channels with the 0.3/0.59/0.11 weights.

type Rgb = [f64; 3];

fn normalized(color: Color8) -> Rgb {
    let [r, g, b, _] = color.0;
    [r as f64 / 255.0, g as f64 / 255.0, b as f64 / 255.0]
}

fn denormalized(c: Rgb, alpha: u8) -> Color8 {
    Rgba([
        (255.0 * c[0]) as u8,
        (255.0 * c[1]) as u8,
        (255.0 * c[2]) as u8,
        alpha,
    ])
}

fn lum(c: Rgb) -> f64 {
    0.3 * c[0] + 0.59 * c[1] + 0.11 * c[2]
}

fn sat(c: Rgb) -> f64 {
    c[0].max(c[1]).max(c[2]) - c[0].min(c[1]).min(c[2])
}

fn clip_color(c: &mut Rgb) {
    let l = lum(*c);
    let n = c[0].min(c[1]).min(c[2]);
    let x = c[0].max(c[1]).max(c[2]);

    if n < 0.0 {
        for v in c.iter_mut() {
            *v = l + (((*v - l) * l) / (l - n));
        }
    }

    if x > 1.0 {
        for v in c.iter_mut() {
            *v = l + (((*v - l) * (1.0 - l)) / (x - l));
        }
    }
}

fn set_lum(c: &mut Rgb, l: f64) {
    let d = l - lum(*c);
    for v in c.iter_mut() {
        *v += d;
    }
    clip_color(c);
}

fn set_sat(c: &mut Rgb, s: f64) {
    let (min, mid, max) = if c[0] < c[1] {
        if c[1] < c[2] {
            (0, 1, 2)
        } else if c[0] < c[2] {
            (0, 2, 1)
        } else {
            (2, 0, 1)
        }
    } else if c[2] < c[1] {
        (2, 1, 0)
    } else if c[2] < c[0] {
        (1, 2, 0)
    } else {
        (1, 0, 2)
    };

    if c[max] > c[min] {
        c[mid] = ((c[mid] - c[min]) * s) / (c[max] - c[min]);
        c[max] = s;
    } else {
        c[mid] = 0.0;
        c[max] = 0.0;
    }
    c[min] = 0.0;
}

fn hsl_hue(backdrop: Color8, src: Color8, opacity: u8) -> Color8 {
    let b = normalized(backdrop);
    let s = sat(b);
    let l = lum(b);

    let mut c = normalized(src);
    set_sat(&mut c, s);
    set_lum(&mut c, l);

    normal(backdrop, denormalized(c, src[3]), opacity)
}

fn hsl_saturation(backdrop: Color8, src: Color8, opacity: u8) -> Color8 {
    let s = sat(normalized(src));

    let mut c = normalized(backdrop);
    let l = lum(c);
    set_sat(&mut c, s);
    set_lum(&mut c, l);

    normal(backdrop, denormalized(c, src[3]), opacity)
}

fn hsl_color(backdrop: Color8, src: Color8, opacity: u8) -> Color8 {
    let l = lum(normalized(backdrop));

    let mut c = normalized(src);
    set_lum(&mut c, l);

    normal(backdrop, denormalized(c, src[3]), opacity)
}

fn hsl_luminosity(backdrop: Color8, src: Color8, opacity: u8) -> Color8 {
    let l = lum(normalized(src));

    let mut c = normalized(backdrop);
    set_lum(&mut c, l);

    normal(backdrop, denormalized(c, src[3]), opacity)
}

// Grayscale: the same compositing on the value channel.

fn normal_gray(backdrop: Gray, src: Gray, opacity: u8) -> Gray {
    let (back_v, back_a) = (backdrop.value as i32, backdrop.alpha as i32);
    let (src_v, src_a) = (src.value as i32, src.alpha as i32);

    if back_a == 0 {
        return Gray::new(src.value, mul_un8(src_a, opacity as i32) as u8);
    } else if src_a == 0 {
        return backdrop;
    }

    let src_a = mul_un8(src_a, opacity as i32);
    let res_a = back_a + src_a - mul_un8(back_a, src_a);
    let res_v = back_v + (src_v - back_v) * src_a / res_a;

    Gray::new(res_v as u8, res_a as u8)
}

fn merge_gray(backdrop: Gray, src: Gray, opacity: u8) -> Gray {
    let (back_v, back_a) = (backdrop.value as i32, backdrop.alpha as i32);
    let (src_v, src_a) = (src.value as i32, src.alpha as i32);
    let opacity = opacity as i32;

    let res_v = if back_a == 0 {
        src_v
    } else if src_a == 0 {
        back_v
    } else {
        back_v + mul_un8(src_v - back_v, opacity)
    };
    let res_a = back_a + mul_un8(src_a - back_a, opacity);
    if res_a == 0 {
        Gray::new(0, 0)
    } else {
        Gray::new(res_v as u8, res_a as u8)
    }
}

fn neg_bw_gray(backdrop: Gray, src: Gray, _opacity: u8) -> Gray {
    if backdrop.alpha == 0 {
        src
    } else if backdrop.value < 128 {
        Gray::new(255, 255)
    } else {
        Gray::new(0, 255)
    }
}

fn gray_channel(backdrop: Gray, src: Gray, opacity: u8, op: ChannelOp) -> Gray {
    let v = op(backdrop.value as i32, src.value as i32);
    normal_gray(backdrop, Gray::new(v as u8, src.alpha), opacity)
}
