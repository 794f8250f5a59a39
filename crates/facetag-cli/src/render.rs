//! Pixel rendering of planned draw instructions.

use ab_glyph::{FontVec, PxScale};
use anyhow::{anyhow, Context, Result};
use facetag_core::{BoxStyle, DrawInstruction};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::Path;

use crate::config::Config;

pub struct Renderer {
    outline: Rgb<u8>,
    highlight: Rgb<u8>,
    font: Option<FontVec>,
    scale: PxScale,
}

impl Renderer {
    pub fn from_config(config: &Config) -> Result<Self> {
        let font = config.font_path.as_deref().map(load_font).transpose()?;
        Ok(Self {
            outline: Rgb(config.outline_color),
            highlight: Rgb(config.highlight_color),
            font,
            scale: PxScale::from(config.font_size),
        })
    }

    /// Draw every instruction in order. Returns how many labels had to be
    /// skipped for lack of a font.
    pub fn render(
        &self,
        image: &mut RgbImage,
        instructions: impl IntoIterator<Item = DrawInstruction>,
    ) -> usize {
        let mut skipped_labels = 0;
        for instruction in instructions {
            match instruction {
                DrawInstruction::Box { rect, style } => {
                    let color = match style {
                        BoxStyle::Outline => self.outline,
                        BoxStyle::Highlight => self.highlight,
                    };
                    let area = Rect::at(rect.left, rect.top).of_size(rect.width(), rect.height());
                    draw_hollow_rect_mut(image, area, color);
                }
                DrawInstruction::Label { text, anchor: (x, y) } => match &self.font {
                    // The anchor is the text baseline; imageproc positions by the top edge.
                    Some(font) => {
                        let top = y - self.scale.y.round() as i32;
                        draw_text_mut(image, self.highlight, x, top, self.scale, font, &text);
                    }
                    None => skipped_labels += 1,
                },
            }
        }
        skipped_labels
    }
}

fn load_font(path: &Path) -> Result<FontVec> {
    let bytes = std::fs::read(path).with_context(|| format!("reading font {}", path.display()))?;
    FontVec::try_from_vec(bytes).map_err(|e| anyhow!("invalid font {}: {e}", path.display()))
}
