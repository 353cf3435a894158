//! Terminal colouring for graph listings.

use owo_colors::{colors::css, OwoColorize};

/// Whether stdout accepts ANSI colours.
pub fn supports_color() -> bool {
    supports_color::on(supports_color::Stream::Stdout).is_some()
}

fn paint(text: &str, styled: impl FnOnce(&str) -> String) -> String {
    if supports_color() {
        styled(text)
    } else {
        text.to_string()
    }
}

/// Colours used when printing vertices, edges and check results.
pub trait Paint {
    /// A tree node (light blue).
    fn node(&self) -> String;
    /// A synthetic testable vertex (green).
    fn testable(&self) -> String;
    /// A dangling reference or other problem (orange).
    fn warning(&self) -> String;
    /// Secondary detail.
    fn dim(&self) -> String;
}

impl Paint for str {
    fn node(&self) -> String {
        paint(self, |s| s.fg::<css::LightBlue>().to_string())
    }

    fn testable(&self) -> String {
        paint(self, |s| s.fg::<css::Green>().to_string())
    }

    fn warning(&self) -> String {
        paint(self, |s| s.fg::<css::Orange>().to_string())
    }

    fn dim(&self) -> String {
        paint(self, |s| s.dimmed().to_string())
    }
}
