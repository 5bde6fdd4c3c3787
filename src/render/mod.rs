//! Turns a key [`Appearance`] into a [`KeyImage`] a frontend can show.

use crate::config::StyleConfig;
use crate::keys::Appearance;

/// Average glyph width relative to the font size, used to fit titles
const GLYPH_WIDTH_RATIO: f32 = 0.6;

/// Rendered key, positioned for an image of `size` pixels
#[derive(Clone, Debug, PartialEq)]
pub struct KeyImage {
    pub size: (u32, u32),
    pub title: String,
    pub icon: String,
    pub icon_color: String,
    /// Top edge of the icon
    pub icon_top: u32,
    /// Baseline of the title, measured from the top
    pub title_baseline: u32,
    pub font: String,
    /// Largest size at which the title fits; `None` if it does not fit at all
    pub font_size: Option<u32>,
}

pub trait Renderer: Send {
    fn render(&self, appearance: &Appearance) -> KeyImage;
}

/// Lays out icon and title from the configured style
pub struct TextRenderer {
    size: (u32, u32),
    style: StyleConfig,
}

impl TextRenderer {
    pub fn new(size: (u32, u32), style: StyleConfig) -> Self {
        Self { size, style }
    }

    /// Largest font size up to `max_fontsize` at which `text` fits between
    /// the paddings.
    pub fn fitting_font_size(&self, text: &str) -> Option<u32> {
        let available = self.size.0.saturating_sub(self.style.padding.saturating_mul(2)) as f32;
        let chars = text.chars().count() as f32;

        (1..=self.style.max_fontsize)
            .take_while(|size| chars * *size as f32 * GLYPH_WIDTH_RATIO <= available)
            .last()
    }
}

impl Renderer for TextRenderer {
    fn render(&self, appearance: &Appearance) -> KeyImage {
        KeyImage {
            size: self.size,
            title: appearance.title.clone(),
            icon: appearance.icon.clone(),
            icon_color: appearance.icon_color.clone(),
            icon_top: self.style.padding,
            title_baseline: self.size.1.saturating_sub(self.style.padding),
            font: self.style.font.clone(),
            font_size: self.fitting_font_size(&appearance.title),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer() -> TextRenderer {
        TextRenderer::new(
            (80, 80),
            StyleConfig {
                padding: 4,
                font: "Test.ttf".to_string(),
                max_fontsize: 16,
            },
        )
    }

    fn appearance(title: &str) -> Appearance {
        Appearance {
            title: title.to_string(),
            icon: "lightbulb".to_string(),
            icon_color: "black".to_string(),
        }
    }

    #[test]
    fn short_title_gets_max_fontsize() {
        let image = renderer().render(&appearance("Hall"));
        assert_eq!(image.font_size, Some(16));
        assert_eq!(image.icon, "lightbulb");
        assert_eq!(image.icon_top, 4);
        assert_eq!(image.title_baseline, 76);
    }

    #[test]
    fn long_title_shrinks_font() {
        // 72px available, 18 chars -> 18 * size * 0.6 <= 72 -> size 6
        let size = renderer().fitting_font_size("Living room lights");
        assert_eq!(size, Some(6));
    }

    #[test]
    fn title_that_never_fits_has_no_font() {
        let title = "x".repeat(200);
        assert_eq!(renderer().fitting_font_size(&title), None);
    }

    #[test]
    fn oversized_padding_leaves_no_room() {
        let renderer = TextRenderer::new(
            (80, 80),
            StyleConfig {
                padding: u32::MAX,
                font: "Test.ttf".to_string(),
                max_fontsize: 16,
            },
        );
        let image = renderer.render(&appearance("Hall"));
        assert_eq!(image.font_size, None);
        assert_eq!(image.title_baseline, 0);
    }
}
