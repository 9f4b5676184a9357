use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::RgbaImage;
use imageproc::drawing::draw_text_mut;

use super::TextStyle;

/// Overrides the system font search with one TTF/OTF file.
pub const FONT_ENV: &str = "ZONE_CONSOLE_FONT";

const REGULAR_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Helvetica.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

const BOLD_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

const BITMAP_CELL: u32 = 8;

/// Glyph source for raster surfaces and label measurement.
///
/// Outline fonts come from the system; when none can be read the built-in
/// 8x8 bitmap face is used so labels are never silently dropped.
#[derive(Clone)]
pub enum Glyphs {
    Outline { regular: FontArc, bold: FontArc },
    Bitmap,
}

impl Glyphs {
    /// Process-wide glyph set, resolved on first use.
    pub fn system() -> &'static Glyphs {
        static GLYPHS: OnceLock<Glyphs> = OnceLock::new();
        GLYPHS.get_or_init(Glyphs::discover)
    }

    fn discover() -> Glyphs {
        if let Some(path) = std::env::var_os(FONT_ENV).map(PathBuf::from) {
            if let Some(font) = read_font(&path) {
                log::info!("label font: {}", path.display());
                return Glyphs::Outline {
                    regular: font.clone(),
                    bold: font,
                };
            }
        }
        let Some(regular) = REGULAR_FONTS.iter().map(Path::new).find_map(read_font) else {
            log::warn!("no outline font found; labels use the built-in bitmap face");
            return Glyphs::Bitmap;
        };
        let bold = BOLD_FONTS
            .iter()
            .map(Path::new)
            .find_map(read_font)
            .unwrap_or_else(|| regular.clone());
        Glyphs::Outline { regular, bold }
    }

    /// Width and line height of `text` in pixels.
    pub fn measure(&self, text: &str, style: &TextStyle) -> (f64, f64) {
        match self {
            Glyphs::Outline { regular, bold } => {
                let font = if style.bold { bold } else { regular };
                let scaled = font.as_scaled(PxScale::from(style.size as f32));
                let mut width = 0.0f32;
                let mut prev = None;
                for ch in text.chars() {
                    let id = scaled.glyph_id(ch);
                    if let Some(prev) = prev {
                        width += scaled.kern(prev, id);
                    }
                    width += scaled.h_advance(id);
                    prev = Some(id);
                }
                (width as f64, scaled.height() as f64)
            }
            Glyphs::Bitmap => {
                let cell = (BITMAP_CELL * bitmap_factor(style.size)) as f64;
                (text.chars().count() as f64 * cell, cell)
            }
        }
    }

    /// Draws `text` with its line box's top-left corner at `(left, top)`.
    pub fn draw(&self, image: &mut RgbaImage, text: &str, left: i32, top: i32, style: &TextStyle) {
        let color = image::Rgba([style.color.r, style.color.g, style.color.b, style.color.a]);
        match self {
            Glyphs::Outline { regular, bold } => {
                let font = if style.bold { bold } else { regular };
                draw_text_mut(image, color, left, top, style.size as f32, font, text);
            }
            Glyphs::Bitmap => {
                let factor = bitmap_factor(style.size);
                let weight = if style.bold { 2 } else { 1 };
                let mut x = left;
                for ch in text.chars() {
                    let rows = BASIC_FONTS
                        .get(ch)
                        .or_else(|| BASIC_FONTS.get('?'))
                        .unwrap_or([0; 8]);
                    for (row, bits) in rows.iter().enumerate() {
                        for col in 0..BITMAP_CELL {
                            if (*bits >> col) & 1 == 0 {
                                continue;
                            }
                            let px = x + (col * factor) as i32;
                            let py = top + (row as u32 * factor) as i32;
                            fill_block(image, px, py, factor + weight - 1, factor, color);
                        }
                    }
                    x += (BITMAP_CELL * factor) as i32;
                }
            }
        }
    }
}

fn read_font(path: &Path) -> Option<FontArc> {
    let bytes = std::fs::read(path).ok()?;
    match FontArc::try_from_vec(bytes) {
        Ok(font) => Some(font),
        Err(err) => {
            log::warn!("unusable font {}: {}", path.display(), err);
            None
        }
    }
}

fn bitmap_factor(size: f64) -> u32 {
    ((size / BITMAP_CELL as f64).round() as u32).max(1)
}

fn fill_block(image: &mut RgbaImage, x: i32, y: i32, w: u32, h: u32, color: image::Rgba<u8>) {
    for dy in 0..h as i32 {
        for dx in 0..w as i32 {
            let (px, py) = (x + dx, y + dy);
            if px >= 0 && py >= 0 && (px as u32) < image.width() && (py as u32) < image.height() {
                image.put_pixel(px as u32, py as u32, color);
            }
        }
    }
}
