//! Legacy `&` color codes and their section-sign wire form.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker that starts a color or format code on the wire.
pub const SECTION: char = '§';

/// Marker used in templates and configuration.
pub const AMPERSAND: char = '&';

const LEGACY_CODES: &str = "0123456789abcdefklmnor";

/// Highest tick rate the server can report.
pub const MAX_TICK_RATE: f64 = 20.0;

/// A single color (or format) applied to a piece of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorSpec {
    /// One of the sixteen legacy colors or a format code such as `l` (bold).
    Legacy(char),
    Rgb(u8, u8, u8),
}

impl ColorSpec {
    pub const BLACK: ColorSpec = ColorSpec::Legacy('0');
    pub const DARK_GRAY: ColorSpec = ColorSpec::Legacy('8');
    pub const GRAY: ColorSpec = ColorSpec::Legacy('7');
    pub const WHITE: ColorSpec = ColorSpec::Legacy('f');
    pub const GREEN: ColorSpec = ColorSpec::Legacy('a');
    pub const YELLOW: ColorSpec = ColorSpec::Legacy('e');
    pub const RED: ColorSpec = ColorSpec::Legacy('c');

    /// `#ffecb8`
    pub const PRIMARY: ColorSpec = ColorSpec::Rgb(0xff, 0xec, 0xb8);
    /// `#ffd769`
    pub const SECONDARY: ColorSpec = ColorSpec::Rgb(0xff, 0xd7, 0x69);

    /// Parses `&7`, `7`, `#ffecb8` or `&#ffecb8`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.strip_prefix(AMPERSAND).unwrap_or(text);

        if let Some(hex) = text.strip_prefix('#') {
            return parse_hex(hex);
        }

        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(code), None) => {
                let code = code.to_ascii_lowercase();
                LEGACY_CODES.contains(code).then_some(ColorSpec::Legacy(code))
            }
            _ => None,
        }
    }
}

impl fmt::Display for ColorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorSpec::Legacy(code) => write!(f, "{}{}", SECTION, code),
            ColorSpec::Rgb(r, g, b) => {
                write!(f, "{}x", SECTION)?;
                for digit in format!("{:02x}{:02x}{:02x}", r, g, b).chars() {
                    write!(f, "{}{}", SECTION, digit)?;
                }
                Ok(())
            }
        }
    }
}

fn parse_hex(hex: &str) -> Option<ColorSpec> {
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
    Some(ColorSpec::Rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

/// Translates `&x` and `&#rrggbb` codes into their section-sign form.
///
/// An ampersand that does not start a valid code is kept as is.
pub fn translate_color_codes(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut rest = text;

    while let Some(pos) = rest.find(AMPERSAND) {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + AMPERSAND.len_utf8()..];

        if let Some(hex) = after.strip_prefix('#').and_then(|h| h.get(..6)) {
            if let Some(color) = parse_hex(hex) {
                out.push_str(&color.to_string());
                rest = &after[7..];
                continue;
            }
        }

        match after.chars().next() {
            Some(code) if LEGACY_CODES.contains(code.to_ascii_lowercase()) => {
                out.push(SECTION);
                out.push(code.to_ascii_lowercase());
                rest = &after[code.len_utf8()..];
            }
            _ => {
                out.push(AMPERSAND);
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Rounds a tick rate to two decimals, capped at [`MAX_TICK_RATE`].
pub fn round_tick_rate(tps: f64) -> f64 {
    (tps.clamp(0.0, MAX_TICK_RATE) * 100.0).round() / 100.0
}

/// Green when healthy, yellow when lagging, red when struggling.
pub fn tick_rate_color(tps: f64) -> ColorSpec {
    if tps >= 18.0 {
        ColorSpec::GREEN
    } else if tps >= 16.0 {
        ColorSpec::YELLOW
    } else {
        ColorSpec::RED
    }
}

/// Colored, rounded tick rate, e.g. `§a19.87`.
pub fn format_tick_rate(tps: f64) -> String {
    let rounded = round_tick_rate(tps);
    format!("{}{:.2}", tick_rate_color(rounded), rounded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_translate_legacy_codes() {
        assert_eq!(translate_color_codes("&7Hello &lWorld"), "§7Hello §lWorld");
        assert_eq!(translate_color_codes("&F upper"), "§f upper");
    }

    #[test]
    fn test_translate_keeps_stray_ampersands() {
        assert_eq!(translate_color_codes("Rock & roll &q"), "Rock & roll &q");
        assert_eq!(translate_color_codes("trailing &"), "trailing &");
        assert_eq!(translate_color_codes("&#12"), "&#12");
    }

    #[test]
    fn test_translate_hex_codes() {
        assert_eq!(
            translate_color_codes("&#ffecb8Players"),
            "§x§f§f§e§c§b§8Players"
        );
        assert_eq!(
            translate_color_codes("&#FFD769!"),
            "§x§f§f§d§7§6§9!"
        );
    }

    #[test]
    fn test_translate_multibyte_text() {
        assert_eq!(translate_color_codes("&7⏰ Oct 16"), "§7⏰ Oct 16");
        assert_eq!(translate_color_codes("ᴘʟᴀʏ&8"), "ᴘʟᴀʏ§8");
    }

    #[test]
    fn test_color_spec_parse() {
        assert_eq!(ColorSpec::parse("&7"), Some(ColorSpec::GRAY));
        assert_eq!(ColorSpec::parse("F"), Some(ColorSpec::WHITE));
        assert_eq!(ColorSpec::parse("#ffecb8"), Some(ColorSpec::PRIMARY));
        assert_eq!(ColorSpec::parse("&#ffd769"), Some(ColorSpec::SECONDARY));
        assert_eq!(ColorSpec::parse("&z"), None);
        assert_eq!(ColorSpec::parse("#ffecb"), None);
        assert_eq!(ColorSpec::parse(""), None);
    }

    #[test]
    fn test_color_spec_display() {
        assert_eq!(ColorSpec::DARK_GRAY.to_string(), "§8");
        assert_eq!(ColorSpec::Rgb(0x01, 0x02, 0xab).to_string(), "§x§0§1§0§2§a§b");
    }

    #[test]
    fn test_round_tick_rate() {
        assert_approx_eq!(round_tick_rate(19.876), 19.88, 1e-9);
        assert_approx_eq!(round_tick_rate(23.5), MAX_TICK_RATE, 1e-9);
        assert_approx_eq!(round_tick_rate(-1.0), 0.0, 1e-9);
    }

    #[test]
    fn test_format_tick_rate() {
        assert_eq!(format_tick_rate(19.876), "§a19.88");
        assert_eq!(format_tick_rate(17.0), "§e17.00");
        assert_eq!(format_tick_rate(9.5), "§c9.50");
    }
}
