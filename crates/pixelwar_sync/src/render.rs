//! Terminal rendering of a canvas for the binaries.

use std::fmt::Write;

use pixelwar_core::{Grid, Rgb};

/// Renders `grid` with 24-bit ANSI background colors, two cells per pixel,
/// with column and row rulers every five pixels.
#[must_use]
pub fn ansi(grid: &Grid) -> String {
    let mut out = String::new();
    out.push_str("    ");
    for x in 0..grid.size().width() {
        if x % 5 == 0 {
            let _ = write!(out, "{x:<2}");
        } else {
            out.push_str("  ");
        }
    }
    out.push('\n');

    for (y, row) in grid.rows().enumerate() {
        let _ = write!(out, "{y:>3} ");
        for &pixel in row {
            let _ = write!(out, "\x1b[48;2;{};{};{}m  ", pixel.r(), pixel.g(), pixel.b());
        }
        out.push_str("\x1b[0m\n");
    }
    out
}

/// Renders `grid` as rows of `#rrggbb`, for terminals without color.
#[must_use]
pub fn plain(grid: &Grid) -> String {
    grid.rows()
        .map(|row| row.iter().map(Rgb::to_string).collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}
