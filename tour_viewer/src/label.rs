//! Hover label drawn into a canvas-backed texture.
//!
//! The panel colours come from a hash of the label text so every hotspot keeps
//! the same palette across visits while neighbouring labels still differ.
//! Text is laid out and rasterized with the embedded UI face.

use fontdue::{Font, FontSettings};
use glam::{Quat, Vec3};
use image::{Rgba, RgbaImage};
use once_cell::sync::Lazy;

use crate::interaction::BillboardHit;
use crate::scene::{ActiveSceneNode, HotspotId};

/// Height of the label above its hotspot, in metres.
const LABEL_LIFT: f32 = 0.9;
const TEXT_COLOR: [u8; 3] = [255, 255, 255];

static FONT_DATA: &[u8] = include_bytes!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/assets/fonts/DejaVuSans.ttf"
));
static FONT: Lazy<Option<Font>> = Lazy::new(|| {
    match Font::from_bytes(FONT_DATA, FontSettings::default()) {
        Ok(font) => Some(font),
        Err(err) => {
            log::error!("label font failed to load: {err}");
            None
        }
    }
});

/// The embedded label face, `None` if it could not be parsed.
pub fn label_font() -> Option<&'static Font> {
    FONT.as_ref()
}

#[derive(Debug, Clone, Copy)]
pub struct LabelStyle {
    pub width: u32,
    pub padding: u32,
    pub corner_radius: u32,
    pub font_px: f32,
    pub line_height: u32,
    pub panel_alpha: u8,
}

impl Default for LabelStyle {
    fn default() -> Self {
        Self {
            width: 512,
            padding: 24,
            corner_radius: 28,
            font_px: 32.0,
            line_height: 40,
            panel_alpha: 230,
        }
    }
}

impl LabelStyle {
    /// Advance width of `text` at the label size.
    pub fn measure(&self, text: &str) -> f32 {
        match label_font() {
            Some(font) => text
                .chars()
                .map(|c| font.metrics(c, self.font_px).advance_width)
                .sum(),
            None => text.chars().count() as f32 * self.font_px * 0.55,
        }
    }
}

/// 32-bit string hash (`h = c + (h << 5) - h`) over UTF-16 code units,
/// wrapping.
pub fn label_hash(label: &str) -> i32 {
    label.encode_utf16().fold(0i32, |hash, unit| {
        (unit as i32)
            .wrapping_add(hash.wrapping_shl(5))
            .wrapping_sub(hash)
    })
}

/// Top and bottom colours of the panel gradient for `label`.
pub fn label_gradient(label: &str) -> ([u8; 3], [u8; 3]) {
    let hue = (label_hash(label).unsigned_abs() % 360) as f32;
    let top = hsl_to_rgb(hue, 0.65, 0.45);
    let bottom = hsl_to_rgb((hue + 40.0) % 360.0, 0.70, 0.28);
    (top, bottom)
}

pub fn hsl_to_rgb(hue: f32, saturation: f32, lightness: f32) -> [u8; 3] {
    let chroma = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
    let sector = hue / 60.0;
    let x = chroma * (1.0 - (sector % 2.0 - 1.0).abs());
    let (r, g, b) = match sector as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = lightness - chroma / 2.0;
    let channel = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    [channel(r), channel(g), channel(b)]
}

/// Greedy word wrap. Words wider than `max_width` get a line of their own.
pub fn wrap_text(text: &str, max_width: f32, measure: impl Fn(&str) -> f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }
        let candidate = format!("{current} {word}");
        if measure(&candidate) <= max_width {
            current = candidate;
        } else {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[derive(Debug, Clone)]
pub struct LabelCanvas {
    pub text: String,
    pub lines: Vec<String>,
    pub image: RgbaImage,
}

/// Paint the rounded gradient panel for `text` and draw its wrapped lines.
pub fn draw_label(text: &str, style: &LabelStyle) -> LabelCanvas {
    let inner = style.width.saturating_sub(style.padding * 2) as f32;
    let mut lines = wrap_text(text, inner, |s| style.measure(s));
    if lines.is_empty() {
        lines.push(String::new());
    }
    let height = style.padding * 2 + style.line_height * lines.len() as u32;
    let (top, bottom) = label_gradient(text);

    let mut image = RgbaImage::new(style.width, height);
    let radius = style.corner_radius.min(style.width / 2).min(height / 2) as f32;
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        if !inside_rounded_rect(x as f32 + 0.5, y as f32 + 0.5, style.width as f32, height as f32, radius) {
            continue;
        }
        let t = y as f32 / (height.max(2) - 1) as f32;
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        *pixel = Rgba([
            mix(top[0], bottom[0]),
            mix(top[1], bottom[1]),
            mix(top[2], bottom[2]),
            style.panel_alpha,
        ]);
    }

    if let Some(font) = label_font() {
        let (ascent, descent) = font
            .horizontal_line_metrics(style.font_px)
            .map(|metrics| (metrics.ascent, metrics.descent))
            .unwrap_or((style.font_px * 0.8, -style.font_px * 0.2));
        for (row, line) in lines.iter().enumerate() {
            let line_top = (style.padding + style.line_height * row as u32) as f32;
            let baseline = line_top + (style.line_height as f32 + ascent + descent) / 2.0;
            let left = ((style.width as f32 - style.measure(line)) / 2.0).max(style.padding as f32);
            draw_line(&mut image, font, line, left, baseline.round() as i32, style.font_px);
        }
    }

    LabelCanvas {
        text: text.to_string(),
        lines,
        image,
    }
}

/// Blend one line of glyph coverage over the panel, pen starting at `left`.
fn draw_line(image: &mut RgbaImage, font: &Font, line: &str, left: f32, baseline: i32, px: f32) {
    let mut pen = left;
    for c in line.chars() {
        let (metrics, coverage) = font.rasterize(c, px);
        let glyph_left = pen.round() as i32 + metrics.xmin;
        let glyph_top = baseline - (metrics.ymin + metrics.height as i32);
        for gy in 0..metrics.height {
            let y = glyph_top + gy as i32;
            if y < 0 || y >= image.height() as i32 {
                continue;
            }
            for gx in 0..metrics.width {
                let alpha = coverage[gy * metrics.width + gx];
                let x = glyph_left + gx as i32;
                if alpha == 0 || x < 0 || x >= image.width() as i32 {
                    continue;
                }
                let pixel = image.get_pixel_mut(x as u32, y as u32);
                let t = alpha as f32 / 255.0;
                for (channel, text) in pixel.0.iter_mut().zip(TEXT_COLOR) {
                    *channel = (*channel as f32 + (text as f32 - *channel as f32) * t).round() as u8;
                }
                pixel.0[3] = pixel.0[3].max(alpha);
            }
        }
        pen += metrics.advance_width;
    }
}

fn inside_rounded_rect(x: f32, y: f32, width: f32, height: f32, radius: f32) -> bool {
    if x < 0.0 || y < 0.0 || x > width || y > height {
        return false;
    }
    let cx = x.clamp(radius, width - radius);
    let cy = y.clamp(radius, height - radius);
    let dx = x - cx;
    let dy = y - cy;
    dx * dx + dy * dy <= radius * radius
}

/// Floating label that follows the hovered hotspot and faces the camera.
#[derive(Debug, Default)]
pub struct HoverLabel {
    style: LabelStyle,
    hotspot: Option<HotspotId>,
    canvas: Option<LabelCanvas>,
    pub position: Vec3,
    pub rotation: Quat,
    redraws: u64,
}

impl HoverLabel {
    pub fn new(style: LabelStyle) -> Self {
        Self {
            style,
            ..Self::default()
        }
    }

    /// Redraw for this frame's hover target, or hide when nothing is hovered.
    pub fn update(&mut self, hit: Option<&BillboardHit>, node: &ActiveSceneNode, world: impl Fn(Vec3) -> Vec3, camera: Vec3) {
        let Some(billboard) = hit.and_then(|hit| node.billboard(hit.hotspot)) else {
            self.hide();
            return;
        };
        if billboard.label.trim().is_empty() {
            self.hide();
            return;
        }

        self.canvas = Some(draw_label(&billboard.label, &self.style));
        self.redraws += 1;
        self.hotspot = Some(billboard.hotspot);
        self.position = world(billboard.position) + Vec3::Y * LABEL_LIFT;
        let to_camera = (camera - self.position).normalize_or_zero();
        self.rotation = if to_camera == Vec3::ZERO {
            Quat::IDENTITY
        } else {
            Quat::from_rotation_arc(Vec3::Z, to_camera)
        };
    }

    pub fn hide(&mut self) {
        self.hotspot = None;
        self.canvas = None;
    }

    pub fn visible(&self) -> bool {
        self.canvas.is_some()
    }

    pub fn hotspot(&self) -> Option<HotspotId> {
        self.hotspot
    }

    pub fn canvas(&self) -> Option<&LabelCanvas> {
        self.canvas.as_ref()
    }

    pub fn redraws(&self) -> u64 {
        self.redraws
    }
}
