//! Server-side meme canvas.
//!
//! A template image is scaled onto a fixed 400x400 canvas and the caption is
//! drawn on top with an 8x8 bitmap font, stroked first and then filled.

use std::io::Cursor;

use async_trait::async_trait;
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{imageops::FilterType, DynamicImage, ImageFormat, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::domain::ImageLoader;
use crate::errors::RenderError;

pub const CANVAS_SIZE: u32 = 400;
/// Total horizontal space kept free of text (half on each side).
pub const TEXT_MARGIN: u32 = 40;
const EDGE_PADDING: i32 = 20;
pub const MIN_FONT_SIZE: u32 = 8;
pub const MAX_FONT_SIZE: u32 = 96;
pub const MAX_STROKE_WIDTH: u32 = 8;
const GLYPH_SIZE: u32 = 8;
const BACKGROUND: Rgba<u8> = Rgba([0xf3, 0xf4, 0xf6, 0xff]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextPosition {
    Top,
    Center,
    #[default]
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlignment {
    Left,
    #[default]
    Center,
    Right,
}

/// How the caption is laid over the template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OverlayInstructions {
    pub text: String,
    pub position: TextPosition,
    pub font_size: u32,
    pub color: String,
    pub stroke_color: String,
    pub stroke_width: u32,
    pub alignment: TextAlignment,
}

impl Default for OverlayInstructions {
    fn default() -> Self {
        Self {
            text: String::new(),
            position: TextPosition::Bottom,
            font_size: 24,
            color: "#000000".to_string(),
            stroke_color: "#ffffff".to_string(),
            stroke_width: 2,
            alignment: TextAlignment::Center,
        }
    }
}

impl OverlayInstructions {
    pub fn for_text(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Self::default() }
    }

    /// Font size and stroke width pulled into the range the canvas can draw.
    pub fn bounded(mut self) -> Self {
        self.font_size = self.font_size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
        self.stroke_width = self.stroke_width.min(MAX_STROKE_WIDTH);
        self
    }

    fn glyph_scale(&self) -> u32 {
        ((self.font_size as f32 / GLYPH_SIZE as f32).round() as u32).max(1)
    }

    fn line_height(&self) -> u32 {
        self.font_size.max(GLYPH_SIZE) + 6
    }
}

/// Greedy word wrap: words are added to the current line while `measure`
/// keeps it within `max_width`; an overflowing word starts the next line.
pub fn wrap_text<F>(text: &str, max_width: u32, measure: F) -> Vec<String>
where
    F: Fn(&str) -> u32,
{
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };

        if measure(&candidate) > max_width && !current.is_empty() {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        } else {
            current = candidate;
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Pixel width of `text` in the bitmap font at `scale`.
pub fn text_width(text: &str, scale: u32) -> u32 {
    u32::try_from(text.chars().count())
        .unwrap_or(u32::MAX)
        .saturating_mul(GLYPH_SIZE)
        .saturating_mul(scale)
}

/// Draws the template scaled to the canvas and the caption on top of it.
pub fn render_meme(base: &DynamicImage, overlay: &OverlayInstructions) -> RgbaImage {
    let overlay = overlay.clone().bounded();
    let mut canvas = RgbaImage::from_pixel(CANVAS_SIZE, CANVAS_SIZE, BACKGROUND);
    let scaled = base.resize_exact(CANVAS_SIZE, CANVAS_SIZE, FilterType::Triangle).to_rgba8();
    image::imageops::overlay(&mut canvas, &scaled, 0, 0);

    let scale = overlay.glyph_scale();
    let lines = wrap_text(&overlay.text, CANVAS_SIZE - TEXT_MARGIN, |line| text_width(line, scale));
    if lines.is_empty() {
        return canvas;
    }

    let fill = parse_hex_color(&overlay.color).unwrap_or(Rgba([0, 0, 0, 255]));
    let stroke = parse_hex_color(&overlay.stroke_color).unwrap_or(Rgba([255, 255, 255, 255]));
    let line_height = overlay.line_height() as i32;
    let block_height = line_height.saturating_mul(i32::try_from(lines.len()).unwrap_or(i32::MAX));
    let canvas_size = CANVAS_SIZE as i32;

    let top = match overlay.position {
        TextPosition::Top => EDGE_PADDING,
        TextPosition::Center => (canvas_size - block_height) / 2,
        TextPosition::Bottom => canvas_size - EDGE_PADDING - block_height,
    };

    let stroke_width = overlay.stroke_width as i32;
    for (index, line) in lines.iter().enumerate() {
        let y = top.saturating_add((index as i32).saturating_mul(line_height));
        if y.saturating_add(line_height + stroke_width) < 0 {
            continue;
        }
        if y - stroke_width >= canvas_size {
            break;
        }
        let width = i32::try_from(text_width(line, scale)).unwrap_or(i32::MAX);
        let x = match overlay.alignment {
            TextAlignment::Left => (TEXT_MARGIN / 2) as i32,
            TextAlignment::Center => (canvas_size - width) / 2,
            TextAlignment::Right => canvas_size - (TEXT_MARGIN / 2) as i32 - width,
        };
        draw_stroked_line(&mut canvas, x, y, line, scale, fill, stroke, stroke_width);
    }

    canvas
}

#[allow(clippy::too_many_arguments)]
fn draw_stroked_line(
    img: &mut RgbaImage,
    x: i32,
    y: i32,
    text: &str,
    scale: u32,
    fill: Rgba<u8>,
    stroke: Rgba<u8>,
    stroke_width: i32,
) {
    for dx in -stroke_width..=stroke_width {
        for dy in -stroke_width..=stroke_width {
            if (dx == 0 && dy == 0) || dx * dx + dy * dy > stroke_width * stroke_width {
                continue;
            }
            draw_bitmap_text(img, x + dx, y + dy, text, stroke, scale);
        }
    }
    draw_bitmap_text(img, x, y, text, fill, scale);
}

fn draw_bitmap_text(img: &mut RgbaImage, x: i32, y: i32, text: &str, color: Rgba<u8>, scale: u32) {
    let scale = scale.max(1) as i32;
    let (width, height) = (img.width() as i32, img.height() as i32);
    let mut cursor_x = x;

    for ch in text.chars() {
        if cursor_x >= width {
            break;
        }
        if let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) {
            for (row, &bits) in glyph.iter().enumerate() {
                for col in 0..GLYPH_SIZE as i32 {
                    // Bit 0 is the leftmost column.
                    if (bits >> col) & 1 == 0 {
                        continue;
                    }
                    let px = cursor_x + col * scale;
                    let py = y + row as i32 * scale;
                    for sy in 0..scale {
                        for sx in 0..scale {
                            let (tx, ty) = (px + sx, py + sy);
                            if tx < 0 || ty < 0 || tx >= width || ty >= height {
                                continue;
                            }
                            let dst = *img.get_pixel(tx as u32, ty as u32);
                            img.put_pixel(tx as u32, ty as u32, blend(dst, color));
                        }
                    }
                }
            }
        }
        cursor_x = cursor_x.saturating_add(GLYPH_SIZE as i32 * scale);
    }
}

fn blend(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let alpha = f32::from(src[3]) / 255.0;
    if alpha <= 0.0 {
        return dst;
    }
    let mix = |d: u8, s: u8| (f32::from(d) * (1.0 - alpha) + f32::from(s) * alpha).round().clamp(0.0, 255.0) as u8;
    let out_alpha = (f32::from(dst[3]) + f32::from(src[3]) * (1.0 - f32::from(dst[3]) / 255.0))
        .round()
        .clamp(0.0, 255.0) as u8;
    Rgba([mix(dst[0], src[0]), mix(dst[1], src[1]), mix(dst[2], src[2]), out_alpha])
}

/// Parses `#rgb`, `#rrggbb` or `#rrggbbaa`.
pub fn parse_hex_color(raw: &str) -> Option<Rgba<u8>> {
    let hex = raw.trim().strip_prefix('#')?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    match hex.len() {
        3 => {
            let expand = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|v| v * 17);
            Some(Rgba([expand(0)?, expand(1)?, expand(2)?, 255]))
        }
        6 => Some(Rgba([channel(0)?, channel(2)?, channel(4)?, 255])),
        8 => Some(Rgba([channel(0)?, channel(2)?, channel(4)?, channel(6)?])),
        _ => None,
    }
}

pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, RenderError> {
    image::load_from_memory(bytes).map_err(RenderError::Decode)
}

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, RenderError> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).map_err(RenderError::Encode)?;
    Ok(out.into_inner())
}

/// Loads template images over plain HTTP(S).
pub struct HttpImageLoader {
    http_client: reqwest::Client,
}

impl HttpImageLoader {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl ImageLoader for HttpImageLoader {
    async fn load(&self, url: &str) -> Result<Vec<u8>, RenderError> {
        let fetch_error = |reason: String| RenderError::Fetch { url: url.to_string(), reason };

        tracing::debug!(%url, "Fetching template image");
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        if !response.status().is_success() {
            return Err(fetch_error(format!("status {}", response.status())));
        }
        let bytes = response.bytes().await.map_err(|e| fetch_error(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
