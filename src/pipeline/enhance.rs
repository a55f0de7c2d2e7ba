//! Image preparation for the classic recognizer.
//!
//! [`preprocess`] produces the cleaned-up image the primary pass reads;
//! the raw pass reads the untouched render. [`Variant`] produces the
//! blur / sharpen copies the multi-pass stack tries on hard pages.
//!
//! All functions take `&DynamicImage` and return a new image: page images
//! are shared between concurrent passes and never mutated.

use crate::script::ScriptProfile;
use image::{imageops::FilterType, DynamicImage, GrayImage, Luma};

/// Smallest page height the classic engine reads comfortably.
const TARGET_HEIGHT: u32 = 2000;
/// Never upscale by more than this; beyond it interpolation invents strokes.
const MAX_UPSCALE: f32 = 3.0;

const SHARPEN_KERNEL: [f32; 9] = [-1.0, -1.0, -1.0, -1.0, 9.0, -1.0, -1.0, -1.0, -1.0];

/// Margins cropped before recognition, as fractions of each dimension.
#[derive(Debug, Clone, Copy)]
pub struct Margins {
    pub top: f32,
    pub bottom: f32,
    pub left: f32,
    pub right: f32,
}

impl Default for Margins {
    /// Running headers, footers and page numbers live here.
    fn default() -> Self {
        Self {
            top: 0.06,
            bottom: 0.06,
            left: 0.03,
            right: 0.03,
        }
    }
}

/// Full preprocessing chain for the primary pass.
pub fn preprocess(img: &DynamicImage, profile: ScriptProfile) -> DynamicImage {
    let gray = DynamicImage::ImageLuma8(img.to_luma8());
    let gray = crop_margins(&gray, Margins::default());
    let gray = upscale_to(&gray, TARGET_HEIGHT);
    let mut gray = stretch_contrast(&gray.to_luma8());

    if profile == ScriptProfile::English {
        gray = DynamicImage::ImageLuma8(gray).filter3x3(&SHARPEN_KERNEL).to_luma8();
    }

    let mut bin = binarize_otsu(&gray);
    ensure_dark_on_light(&mut bin);
    DynamicImage::ImageLuma8(bin)
}

/// Enhancement copies tried by the multi-pass stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Blur,
    Sharpen,
}

impl Variant {
    pub const ALL: [Variant; 2] = [Variant::Blur, Variant::Sharpen];

    pub fn label(self) -> &'static str {
        match self {
            Variant::Blur => "enhanced-blur",
            Variant::Sharpen => "enhanced-sharpen",
        }
    }

    pub fn apply(self, img: &DynamicImage) -> DynamicImage {
        match self {
            Variant::Blur => img.blur(0.8),
            Variant::Sharpen => img.filter3x3(&SHARPEN_KERNEL),
        }
    }
}

/// Crop fractional margins. Images too small to crop are returned unchanged.
pub fn crop_margins(img: &DynamicImage, m: Margins) -> DynamicImage {
    let (w, h) = (img.width(), img.height());
    let left = (w as f32 * m.left) as u32;
    let right = (w as f32 * m.right) as u32;
    let top = (h as f32 * m.top) as u32;
    let bottom = (h as f32 * m.bottom) as u32;
    if left + right >= w || top + bottom >= h {
        return img.clone();
    }
    img.crop_imm(left, top, w - left - right, h - top - bottom)
}

/// Upscale so the height reaches `target`, never shrinking.
pub fn upscale_to(img: &DynamicImage, target: u32) -> DynamicImage {
    let h = img.height();
    if h == 0 || h >= target {
        return img.clone();
    }
    let factor = (target as f32 / h as f32).min(MAX_UPSCALE);
    let new_w = (img.width() as f32 * factor).round() as u32;
    let new_h = (h as f32 * factor).round() as u32;
    img.resize_exact(new_w.max(1), new_h.max(1), FilterType::CatmullRom)
}

/// Linear stretch between the 1st and 99th luminance percentiles.
pub fn stretch_contrast(gray: &GrayImage) -> GrayImage {
    let hist = histogram(gray);
    let total: u64 = hist.iter().sum();
    if total == 0 {
        return gray.clone();
    }
    let cut = total / 100;
    let lo = percentile(&hist, cut);
    let hi = percentile(&hist, total - cut.max(1));
    if hi <= lo {
        return gray.clone();
    }
    let span = (hi - lo) as f32;
    let mut out = gray.clone();
    for p in out.pixels_mut() {
        let v = p.0[0].clamp(lo, hi);
        p.0[0] = (((v - lo) as f32 / span) * 255.0).round() as u8;
    }
    out
}

fn histogram(gray: &GrayImage) -> [u64; 256] {
    let mut hist = [0u64; 256];
    for p in gray.pixels() {
        hist[p.0[0] as usize] += 1;
    }
    hist
}

fn percentile(hist: &[u64; 256], rank: u64) -> u8 {
    let mut acc = 0u64;
    for (level, &count) in hist.iter().enumerate() {
        acc += count;
        if acc >= rank {
            return level as u8;
        }
    }
    255
}

/// Otsu's global threshold.
pub fn otsu_threshold(gray: &GrayImage) -> u8 {
    let hist = histogram(gray);
    let total: u64 = hist.iter().sum();
    if total == 0 {
        return 127;
    }
    let sum_all: f64 = hist.iter().enumerate().map(|(i, &c)| i as f64 * c as f64).sum();

    let (mut w_bg, mut sum_bg) = (0u64, 0f64);
    let (mut best, mut best_var) = (0u8, -1f64);
    for (t, &count) in hist.iter().enumerate() {
        w_bg += count;
        if w_bg == 0 {
            continue;
        }
        let w_fg = total - w_bg;
        if w_fg == 0 {
            break;
        }
        sum_bg += t as f64 * count as f64;
        let mean_bg = sum_bg / w_bg as f64;
        let mean_fg = (sum_all - sum_bg) / w_fg as f64;
        let between = w_bg as f64 * w_fg as f64 * (mean_bg - mean_fg).powi(2);
        if between > best_var {
            best_var = between;
            best = t as u8;
        }
    }
    best
}

pub fn binarize_otsu(gray: &GrayImage) -> GrayImage {
    let t = otsu_threshold(gray);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y).0[0] > t {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Invert a binary image whose background came out dark.
pub fn ensure_dark_on_light(bin: &mut GrayImage) {
    let n = (bin.width() as u64 * bin.height() as u64).max(1);
    let sum: u64 = bin.pixels().map(|p| p.0[0] as u64).sum();
    if sum / n < 127 {
        image::imageops::invert(bin);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_tone(w: u32, h: u32, dark: u8, light: u8) -> GrayImage {
        GrayImage::from_fn(w, h, |x, _| if x < w / 4 { Luma([dark]) } else { Luma([light]) })
    }

    #[test]
    fn otsu_separates_two_tones() {
        let img = two_tone(40, 10, 40, 200);
        let t = otsu_threshold(&img);
        assert!((40..200).contains(&t), "threshold {t}");
        let bin = binarize_otsu(&img);
        assert_eq!(bin.get_pixel(0, 0).0[0], 0);
        assert_eq!(bin.get_pixel(39, 0).0[0], 255);
    }

    #[test]
    fn inverted_page_is_flipped() {
        let mut bin = two_tone(40, 10, 255, 0);
        ensure_dark_on_light(&mut bin);
        assert_eq!(bin.get_pixel(39, 0).0[0], 255);
    }

    #[test]
    fn upscale_respects_cap() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(100, 100));
        let up = upscale_to(&img, 2000);
        assert_eq!(up.height(), 300);
        let big = DynamicImage::ImageLuma8(GrayImage::new(10, 2500));
        assert_eq!(upscale_to(&big, 2000).height(), 2500);
    }

    #[test]
    fn crop_removes_margins() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(100, 100));
        let cropped = crop_margins(&img, Margins::default());
        assert_eq!((cropped.width(), cropped.height()), (94, 88));
        let tiny = DynamicImage::ImageLuma8(GrayImage::new(1, 1));
        assert_eq!(crop_margins(&tiny, Margins::default()).width(), 1);
    }

    #[test]
    fn preprocess_yields_binary_image() {
        let img = DynamicImage::ImageLuma8(two_tone(200, 300, 30, 220));
        let out = preprocess(&img, ScriptProfile::Bangla).to_luma8();
        assert!(out.height() >= 2000 / 3);
        assert!(out.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }

    #[test]
    fn variants_keep_dimensions() {
        let img = DynamicImage::ImageLuma8(two_tone(20, 20, 0, 255));
        for v in Variant::ALL {
            let out = v.apply(&img);
            assert_eq!((out.width(), out.height()), (20, 20), "{}", v.label());
        }
    }
}
