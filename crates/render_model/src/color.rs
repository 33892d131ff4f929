//! Author highlight colors
//!
//! Colors are derived from the author id alone so the same author renders
//! with the same color everywhere, live or offline, without a lookup table.

use serde::{Deserialize, Serialize};

/// Color representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Convert from hue (degrees), saturation and lightness (0.0..=1.0)
    pub fn from_hsl(hue: f64, saturation: f64, lightness: f64) -> Self {
        let c = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
        let h = (hue % 360.0) / 60.0;
        let x = c * (1.0 - (h % 2.0 - 1.0).abs());
        let (r, g, b) = match h as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        let m = lightness - c / 2.0;
        let channel = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        Self::rgb(channel(r), channel(g), channel(b))
    }

    /// CSS hex notation
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub const BLACK: Color = Color::rgb(0, 0, 0);
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

/// Highlight colors for one author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorColor {
    pub hue: u16,
    /// Background of highlighted text
    pub highlight: Color,
    /// Underline and popover accent
    pub accent: Color,
}

impl AuthorColor {
    /// Inline style for a highlight element
    pub fn style(&self) -> String {
        format!(
            "background-color: {}; border-bottom: 2px solid {}",
            self.highlight.to_hex(),
            self.accent.to_hex()
        )
    }
}

/// Hue in degrees for an author, from a 32-bit FNV-1a hash of the id
pub fn author_hue(author_id: &str) -> u16 {
    let hash = author_id.bytes().fold(0x811c_9dc5_u32, |hash, byte| {
        (hash ^ byte as u32).wrapping_mul(0x0100_0193)
    });
    (hash % 360) as u16
}

/// Highlight colors for an author
pub fn author_color(author_id: &str) -> AuthorColor {
    let hue = author_hue(author_id);
    AuthorColor {
        hue,
        highlight: Color::from_hsl(hue as f64, 0.85, 0.85),
        accent: Color::from_hsl(hue as f64, 0.65, 0.45),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hsl_primaries() {
        assert_eq!(Color::from_hsl(0.0, 1.0, 0.5), Color::rgb(255, 0, 0));
        assert_eq!(Color::from_hsl(120.0, 1.0, 0.5), Color::rgb(0, 255, 0));
        assert_eq!(Color::from_hsl(240.0, 1.0, 0.5), Color::rgb(0, 0, 255));
        assert_eq!(Color::from_hsl(0.0, 0.0, 1.0).to_hex(), "#ffffff");
    }

    #[test]
    fn test_author_color_is_deterministic() {
        assert_eq!(author_color("alice"), author_color("alice"));
        assert!(author_hue("alice") < 360);
        // FNV-1a of the empty string is the offset basis
        assert_eq!(author_hue(""), (0x811c_9dc5_u32 % 360) as u16);
    }

    #[test]
    fn test_distinct_authors_differ() {
        let hues: Vec<u16> = ["alice", "bob", "carol", "dave", "erin"]
            .iter()
            .map(|a| author_hue(a))
            .collect();
        assert_eq!(hues, vec![239, 284, 2, 31, 25]);
    }
}
